//! Read-through interception.
//!
//! Per request: lookup → (hit: return) | (miss or lookup error: fetch →
//! spawn cache write → return). A failed fetch after a miss ends the request
//! without a response and without a cache write.

use std::sync::Arc;

use axum::http::Method;
use metrics::counter;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::events::{ExtendableEvent, FetchEvent};
use super::fetch::{FetchError, Fetcher, InterceptedRequest};
use super::lifecycle::{precache, purge_all};
use super::population::PopulationTasks;
use crate::cache::{CachedResponse, Caches, NamespaceStrategy};

const METRIC_HIT: &str = "cachefront_cache_hit_total";
const METRIC_MISS: &str = "cachefront_cache_miss_total";
const METRIC_LOOKUP_ERROR: &str = "cachefront_cache_lookup_error_total";
const METRIC_FETCH_FAILURE: &str = "cachefront_fetch_failure_total";

/// Callbacks a host delivers to a worker.
///
/// Handlers register asynchronous work on the event (`wait_until`,
/// `respond_with`) instead of doing it inline; the host drives that work.
pub trait WorkerHandler: Send + Sync {
    fn on_install(&self, event: &mut ExtendableEvent);
    fn on_activate(&self, event: &mut ExtendableEvent);
    fn on_intercept(&self, event: &mut FetchEvent);
}

/// Result of intercepting one request.
#[derive(Debug)]
pub enum Interception {
    /// Served from the store; the network was not touched.
    CacheHit(CachedResponse),
    /// Served from the network; a cache write was spawned if storable.
    Fetched(CachedResponse),
    /// Cache miss followed by a network failure.
    Failed(FetchError),
}

impl Interception {
    pub fn response(&self) -> Option<&CachedResponse> {
        match self {
            Self::CacheHit(response) | Self::Fetched(response) => Some(response),
            Self::Failed(_) => None,
        }
    }

    pub fn into_response(self) -> Option<CachedResponse> {
        match self {
            Self::CacheHit(response) | Self::Fetched(response) => Some(response),
            Self::Failed(_) => None,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::CacheHit(_) => "hit",
            Self::Fetched(_) => "fetched",
            Self::Failed(_) => "failed",
        }
    }
}

/// Whether a network response may be written to the store.
///
/// Mirrors browser cache rules: only GET requests are stored, and partial
/// content never is. Error statuses are stored like any other.
pub fn is_storable(request: &InterceptedRequest, response: &CachedResponse) -> bool {
    request.method == Method::GET && response.status != 206
}

/// Worker that serves from the cache, falls back to the network and purges
/// everything on activation.
#[derive(Clone)]
pub struct ReadThroughWorker {
    caches: Caches,
    fetcher: Arc<dyn Fetcher>,
    strategy: NamespaceStrategy,
    precache: Arc<[Url]>,
    population: Arc<PopulationTasks>,
}

impl ReadThroughWorker {
    pub fn new(caches: Caches, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            caches,
            fetcher,
            strategy: NamespaceStrategy::default(),
            precache: Arc::from(Vec::new()),
            population: Arc::new(PopulationTasks::new()),
        }
    }

    pub fn with_strategy(mut self, strategy: NamespaceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// URLs fetched and stored once the activation purge settles.
    pub fn with_precache(mut self, urls: Vec<Url>) -> Self {
        self.precache = Arc::from(urls);
        self
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn population(&self) -> &PopulationTasks {
        &self.population
    }

    /// Wait for every cache write spawned so far.
    pub async fn settle_population(&self) {
        self.population.settle().await;
    }

    #[instrument(skip_all, fields(url = %request.url, method = %request.method))]
    pub async fn intercept(&self, request: InterceptedRequest) -> Interception {
        let key = request.cache_key().to_string();
        info!("handling fetch");

        match self.caches.match_key(&key).await {
            Ok(Some(response)) => {
                debug!(
                    cache = "store",
                    outcome = "hit",
                    status = response.status,
                    "serving cached response"
                );
                counter!(METRIC_HIT).increment(1);
                return Interception::CacheHit(response);
            }
            Ok(None) => {
                debug!(cache = "store", outcome = "miss", "cache miss, fetching");
                counter!(METRIC_MISS).increment(1);
            }
            Err(err) => {
                warn!(
                    cache = "store",
                    outcome = "error",
                    error = %err,
                    "cache lookup failed, fetching"
                );
                counter!(METRIC_LOOKUP_ERROR).increment(1);
            }
        }

        match self.fetcher.fetch(request.clone()).await {
            Ok(response) => {
                debug!(status = response.status, "fetched response");
                self.populate(&request, response.clone());
                Interception::Fetched(response)
            }
            Err(err) => {
                error!(error = %err, "fetch failed");
                counter!(METRIC_FETCH_FAILURE).increment(1);
                Interception::Failed(err)
            }
        }
    }

    fn populate(&self, request: &InterceptedRequest, response: CachedResponse) {
        if !is_storable(request, &response) {
            debug!(
                status = response.status,
                "response not storable; skipping cache write"
            );
            return;
        }

        let key = request.cache_key().to_string();
        let namespace = self.strategy.namespace_for(&key);
        let caches = self.caches.clone();
        let write_key = key.clone();

        self.population.spawn(key, async move {
            let cache = caches.open(&namespace).await;
            cache.put(&write_key, response).await
        });
    }
}

impl WorkerHandler for ReadThroughWorker {
    fn on_install(&self, _event: &mut ExtendableEvent) {
        info!("installing");
    }

    fn on_activate(&self, event: &mut ExtendableEvent) {
        let worker = self.clone();
        event.wait_until(async move {
            let report = purge_all(&worker.caches).await;
            info!(
                purged = report.purged.len(),
                failed = report.failed.len(),
                "activation purge finished"
            );

            // Pre-warmed entries must land after the purge or it would drop them.
            if worker.precache.is_empty() {
                return;
            }
            let report = precache(
                &worker.caches,
                &worker.fetcher,
                &worker.strategy,
                &worker.precache,
            )
            .await;
            info!(
                stored = report.stored.len(),
                failed = report.failed.len(),
                "precache finished"
            );
        });
    }

    fn on_intercept(&self, event: &mut FetchEvent) {
        let worker = self.clone();
        let request = event.request().clone();
        let answered =
            event.respond_with(async move { worker.intercept(request).await.into_response() });
        if let Err(err) = answered {
            warn!(error = %err, "fetch event already answered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method) -> InterceptedRequest {
        InterceptedRequest::new(method, Url::parse("http://origin.test/a.json").unwrap())
    }

    #[test]
    fn only_get_is_storable() {
        let ok = CachedResponse::new(200, "x");
        assert!(is_storable(&request(Method::GET), &ok));
        assert!(!is_storable(&request(Method::POST), &ok));
        assert!(!is_storable(&request(Method::PUT), &ok));
    }

    #[test]
    fn partial_content_is_not_storable() {
        let get = request(Method::GET);
        assert!(!is_storable(&get, &CachedResponse::new(206, "x")));
        assert!(is_storable(&get, &CachedResponse::new(404, "x")));
    }

    #[test]
    fn interception_exposes_response() {
        let hit = Interception::CacheHit(CachedResponse::new(200, "x"));
        assert_eq!(hit.outcome(), "hit");
        assert!(hit.response().is_some());

        let failed = Interception::Failed(FetchError::network(
            &Url::parse("http://origin.test/a.json").unwrap(),
            "refused",
        ));
        assert_eq!(failed.outcome(), "failed");
        assert!(failed.into_response().is_none());
    }
}
