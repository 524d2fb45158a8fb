//! Host adapter: turns inbound HTTP requests into fetch events.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, Limited};
use tracing::debug;
use url::Url;

use super::middleware::{log_responses, set_request_context};
use crate::cache::CachedResponse;
use crate::error::HttpError;
use crate::worker::{InterceptedRequest, WorkerHost};

const SOURCE: &str = "infra::http::proxy";

/// Headers scoped to a single connection; never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
pub struct ProxyState {
    pub host: Arc<WorkerHost>,
    pub origin: Url,
    pub max_body_bytes: usize,
}

pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .fallback(proxy_request)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn proxy_request(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let intercepted = match intercept(&state, request).await {
        Ok(intercepted) => intercepted,
        Err(err) => return err.into_response(),
    };

    match state.host.fetch(intercepted).await {
        Some(cached) => build_response(cached),
        None => HttpError::new(
            SOURCE,
            StatusCode::BAD_GATEWAY,
            "Bad gateway",
            "request ended without a response",
        )
        .into_response(),
    }
}

async fn intercept(
    state: &ProxyState,
    request: Request<Body>,
) -> Result<InterceptedRequest, HttpError> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or("/");
    let url = origin_url(&state.origin, path_and_query).map_err(|err| {
        HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid request target", &err)
    })?;

    let body = Limited::new(body, state.max_body_bytes)
        .collect()
        .await
        .map_err(|err| {
            HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Request body rejected",
                err.to_string(),
            )
        })?
        .to_bytes();

    let mut intercepted = InterceptedRequest::new(parts.method, url).with_body(body);
    intercepted.headers = forwardable_headers(&parts.headers);

    debug!(url = %intercepted.url, method = %intercepted.method, "intercepted request");
    Ok(intercepted)
}

/// Resolve an inbound path against the origin.
///
/// Leading slashes collapse to one so a path like `//other.host/x` stays on
/// the origin instead of resolving as a network-path reference.
pub fn origin_url(origin: &Url, path_and_query: &str) -> Result<Url, url::ParseError> {
    let relative = format!("/{}", path_and_query.trim_start_matches('/'));
    origin.join(&relative)
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP
        .iter()
        .any(|candidate| name.eq_ignore_ascii_case(candidate))
}

fn forwardable_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name.as_str())
                && **name != header::HOST
                && **name != header::CONTENT_LENGTH
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}

fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if is_hop_by_hop(&name) || name.eq_ignore_ascii_case(header::CONTENT_LENGTH.as_str()) {
            continue;
        }
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://origin.test").unwrap()
    }

    #[test]
    fn path_and_query_resolve_against_origin() {
        let url = origin_url(&origin(), "/posts/1.json?page=2").unwrap();
        assert_eq!(url.as_str(), "http://origin.test/posts/1.json?page=2");
    }

    #[test]
    fn network_path_reference_stays_on_origin() {
        let url = origin_url(&origin(), "//elsewhere.test/x").unwrap();
        assert_eq!(url.host_str(), Some("origin.test"));
        assert_eq!(url.path(), "/elsewhere.test/x");
    }

    #[test]
    fn hop_by_hop_headers_are_not_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::HOST, HeaderValue::from_static("proxy.test"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let forwarded = forwardable_headers(&headers);
        assert_eq!(
            forwarded,
            vec![("accept".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn build_response_keeps_status_and_end_to_end_headers() {
        let cached = CachedResponse::new(404, "missing")
            .with_header("Content-Type", "text/plain")
            .with_header("Transfer-Encoding", "chunked");

        let response = build_response(cached);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
    }
}
