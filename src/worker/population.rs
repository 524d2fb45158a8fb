//! Detached cache writes.
//!
//! A network response is returned to the caller before its cache write
//! finishes. Writes run as tracked background tasks whose failures are
//! logged and counted here instead of reaching the request path.

use std::future::Future;
use std::sync::Mutex;

use metrics::counter;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{StoreError, mutex_lock};

const SOURCE: &str = "worker::population";
const METRIC_POPULATE: &str = "cachefront_cache_populate_total";
const METRIC_POPULATE_FAILURE: &str = "cachefront_cache_populate_failure_total";

#[derive(Default)]
pub struct PopulationTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl PopulationTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a cache write for `key`. Must be called inside a tokio runtime.
    pub fn spawn<F>(&self, key: String, write: F)
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let mut tasks = mutex_lock(&self.tasks, SOURCE, "spawn");
        while let Some(finished) = tasks.try_join_next() {
            report_join(finished);
        }

        tasks.spawn(async move {
            match write.await {
                Ok(()) => {
                    debug!(url = %key, "response cached");
                    counter!(METRIC_POPULATE).increment(1);
                }
                Err(err) => {
                    warn!(url = %key, error = %err, "caching response failed");
                    counter!(METRIC_POPULATE_FAILURE).increment(1);
                }
            }
        });
    }

    /// Writes spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        mutex_lock(&self.tasks, SOURCE, "in_flight").len()
    }

    /// Wait for every write spawned so far.
    pub async fn settle(&self) {
        let mut tasks = std::mem::take(&mut *mutex_lock(&self.tasks, SOURCE, "settle"));
        while let Some(finished) = tasks.join_next().await {
            report_join(finished);
        }
    }
}

fn report_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        warn!(error = %err, "cache write task did not complete");
        counter!(METRIC_POPULATE_FAILURE).increment(1);
    }
}
