//! Install and activate behavior.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use super::fetch::{FetchError, Fetcher, InterceptedRequest};
use crate::cache::{Caches, NamespaceStrategy, StoreError};

const METRIC_PURGE: &str = "cachefront_cache_purge_total";
const METRIC_PURGE_FAILURE: &str = "cachefront_cache_purge_failure_total";

/// Outcome of an activation purge.
#[derive(Debug, Default)]
pub struct PurgeReport {
    /// Namespaces enumerated and removed (including ones already gone).
    pub purged: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
    /// Set when the namespaces could not be listed, so nothing was deleted.
    pub listing_error: Option<StoreError>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.listing_error.is_none()
    }
}

/// Delete every namespace concurrently.
///
/// Completes once every deletion has settled. One failing namespace does not
/// stop the others. A listing failure deletes nothing and leaves the report
/// unclean.
pub async fn purge_all(caches: &Caches) -> PurgeReport {
    let names = match caches.keys().await {
        Ok(names) => names,
        Err(err) => {
            error!(error = %err, "listing namespaces for purge failed");
            counter!(METRIC_PURGE_FAILURE).increment(1);
            return PurgeReport {
                listing_error: Some(err),
                ..Default::default()
            };
        }
    };

    let deletions = names.into_iter().map(|name| async move {
        info!(namespace = %name, "purging cache");
        let result = caches.delete(&name).await;
        (name, result)
    });

    let mut report = PurgeReport::default();
    for (name, result) in join_all(deletions).await {
        match result {
            Ok(_) => {
                counter!(METRIC_PURGE).increment(1);
                report.purged.push(name);
            }
            Err(err) => {
                warn!(namespace = %name, error = %err, "purging cache failed");
                counter!(METRIC_PURGE_FAILURE).increment(1);
                report.failed.push((name, err));
            }
        }
    }

    report
}

#[derive(Debug, Error)]
pub enum PrecacheFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of pre-warming after the activation purge.
#[derive(Debug, Default)]
pub struct PrecacheReport {
    pub stored: Vec<String>,
    pub failed: Vec<(String, PrecacheFailure)>,
}

/// Fetch each URL and store it under the namespace `strategy` picks.
///
/// Failures are logged per URL and never abort the rest.
pub async fn precache(
    caches: &Caches,
    fetcher: &Arc<dyn Fetcher>,
    strategy: &NamespaceStrategy,
    urls: &[Url],
) -> PrecacheReport {
    let mut report = PrecacheReport::default();

    for url in urls {
        let request = InterceptedRequest::get(url.clone());
        let key = request.cache_key().to_string();

        let response = match fetcher.fetch(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %key, error = %err, "precache fetch failed");
                report.failed.push((key, PrecacheFailure::Fetch(err)));
                continue;
            }
        };

        let cache = caches.open(&strategy.namespace_for(&key)).await;
        match cache.put(&key, response).await {
            Ok(()) => {
                info!(url = %key, namespace = %cache.namespace(), "precached");
                report.stored.push(key);
            }
            Err(err) => {
                warn!(url = %key, error = %err, "precache write failed");
                report.failed.push((key, PrecacheFailure::Store(err)));
            }
        }
    }

    report
}
