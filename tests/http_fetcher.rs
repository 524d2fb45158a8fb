use std::num::NonZeroU32;
use std::time::Duration;

use axum::http::Method;
use cachefront::worker::{FetchError, Fetcher, HttpFetcher, InterceptedRequest, RetryingFetcher};
use httpmock::MockServer;
use url::Url;

fn request_to(server: &MockServer, path: &str) -> InterceptedRequest {
    InterceptedRequest::get(Url::parse(&server.url(path)).expect("mock url"))
}

#[tokio::test]
async fn fetch_captures_status_headers_and_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET").path("/a.json").header("accept", "application/json");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":1}"#);
        })
        .await;

    let fetcher = HttpFetcher::new(None).expect("client");
    let response = fetcher
        .fetch(request_to(&server, "/a.json").with_header("accept", "application/json"))
        .await
        .expect("origin reachable");

    mock.assert_async().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Type"), Some("application/json"));
    assert_eq!(response.body, r#"{"id":1}"#);
}

#[tokio::test]
async fn error_statuses_are_responses_not_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/gone");
            then.status(404).body("not here");
        })
        .await;

    let fetcher = HttpFetcher::new(None).expect("client");
    let response = fetcher
        .fetch(request_to(&server, "/gone"))
        .await
        .expect("404 is still a response");

    assert_eq!(response.status, 404);
    assert_eq!(response.body, "not here");
}

#[tokio::test]
async fn request_body_and_method_are_forwarded() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST").path("/submit").body("payload");
            then.status(201);
        })
        .await;

    let url = Url::parse(&server.url("/submit")).expect("mock url");
    let fetcher = HttpFetcher::new(None).expect("client");
    let response = fetcher
        .fetch(InterceptedRequest::new(Method::POST, url).with_body("payload"))
        .await
        .expect("origin reachable");

    mock.assert_async().await;
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn unreachable_origin_is_a_network_error() {
    // Bind then drop a listener so the port is known to be closed.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let url = Url::parse(&format!("http://{addr}/a.json")).expect("url");
    let fetcher = HttpFetcher::new(Some(Duration::from_secs(2))).expect("client");
    let err = fetcher
        .fetch(InterceptedRequest::get(url))
        .await
        .expect_err("connection refused");

    assert!(matches!(err, FetchError::Network { .. }));
}

#[tokio::test]
async fn retrying_fetcher_does_not_retry_http_errors() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET").path("/flaky");
            then.status(503);
        })
        .await;

    let fetcher = RetryingFetcher::new(
        HttpFetcher::new(None).expect("client"),
        NonZeroU32::new(3).unwrap(),
        Duration::ZERO,
    );
    let response = fetcher
        .fetch(request_to(&server, "/flaky"))
        .await
        .expect("503 is a response");

    assert_eq!(response.status, 503);
    mock.assert_async().await;
}
