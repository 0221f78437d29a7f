//! Telemetry for requests to the Elasticsearch service.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;

/// Duration (in seconds) of requests to the Elasticsearch service.
pub static REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "breakglass_index_elasticsearch_request_duration",
            "Duration (in seconds) of requests to the Elasticsearch service",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["op"],
    )
    .expect("failed to initialise REQUEST_DURATION histogram")
});

/// Ensure metrics are registered only once.
static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the Elasticsearch backend metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    // Skip registration if already done before.
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }
    reg.register(Box::new(REQUEST_DURATION.clone()))?;
    Ok(())
}
