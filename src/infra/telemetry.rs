use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every counter the cache emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "cachefront_cache_hit_total",
            Unit::Count,
            "Requests answered from the cache store."
        );
        describe_counter!(
            "cachefront_cache_miss_total",
            Unit::Count,
            "Lookups that found no stored response."
        );
        describe_counter!(
            "cachefront_cache_lookup_error_total",
            Unit::Count,
            "Lookups that failed and fell back to the network."
        );
        describe_counter!(
            "cachefront_fetch_failure_total",
            Unit::Count,
            "Network fetches that failed after a miss."
        );
        describe_counter!(
            "cachefront_cache_populate_total",
            Unit::Count,
            "Fetched responses written to the cache store."
        );
        describe_counter!(
            "cachefront_cache_populate_failure_total",
            Unit::Count,
            "Cache writes that failed or did not complete."
        );
        describe_counter!(
            "cachefront_cache_purge_total",
            Unit::Count,
            "Namespaces deleted during activation."
        );
        describe_counter!(
            "cachefront_cache_purge_failure_total",
            Unit::Count,
            "Namespace deletions or enumerations that failed during activation."
        );
        describe_counter!(
            "cachefront_cache_namespace_evict_total",
            Unit::Count,
            "Namespaces evicted from the memory backend due to capacity."
        );
    });
}
