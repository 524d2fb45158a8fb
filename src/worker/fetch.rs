//! Network boundary.
//!
//! `Fetcher` is the primitive the worker falls back to on a cache miss.
//! `HttpFetcher` performs real requests; `RetryingFetcher` wraps any fetcher
//! with a bounded retry policy and is never part of the core state machine.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::cache::CachedResponse;

/// Outbound request descriptor.
///
/// Immutable once built; cloning is cheap so the same request can feed the
/// network path while the original stays intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Request identity used for cache lookups and writes.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("network request to `{url}` failed: {detail}")]
    Network { url: String, detail: String },
    #[error("failed to read response body from `{url}`: {detail}")]
    Body { url: String, detail: String },
}

impl FetchError {
    pub fn network(url: &Url, detail: impl Into<String>) -> Self {
        Self::Network {
            url: url.to_string(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: InterceptedRequest) -> Result<CachedResponse, FetchError>;
}

/// `Fetcher` backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client. `timeout` of `None` lets a hung origin block the request.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: InterceptedRequest) -> Result<CachedResponse, FetchError> {
        let InterceptedRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut outbound = self.client.request(method, url.clone());
        for (name, value) in &headers {
            outbound = outbound.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            outbound = outbound.body(body);
        }

        let response = outbound
            .send()
            .await
            .map_err(|err| FetchError::network(&url, err.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|err| FetchError::Body {
            url: url.to_string(),
            detail: err.to_string(),
        })?;

        debug!(url = %url, status, bytes = body.len(), "origin responded");

        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

/// Bounded retry decorator around another fetcher.
///
/// Only transport failures are retried; any HTTP status is a success.
pub struct RetryingFetcher<F> {
    inner: F,
    attempts: NonZeroU32,
    backoff: Duration,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, attempts: NonZeroU32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts,
            backoff,
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, request: InterceptedRequest) -> Result<CachedResponse, FetchError> {
        let attempts = self.attempts.get();
        let mut attempt = 1;
        loop {
            match self.inner.fetch(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < attempts => {
                    warn!(
                        url = %request.url,
                        attempt,
                        attempts,
                        error = %err,
                        "fetch failed; retrying"
                    );
                    attempt += 1;
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
