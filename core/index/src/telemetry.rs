//! Telemetry related to index requests, credential rotation and bulk indexing.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::CounterVec;
use prometheus::Opts;

/// Number of bulk items rejected by the index.
pub static BULK_ITEM_ERR: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "breakglass_index_bulk_item_error",
            "Number of bulk items rejected by the index",
        ),
        &["status"],
    )
    .expect("failed to initialise BULK_ITEM_ERR counter")
});

/// Number of documents dropped because the bulk buffer was full.
pub static BULK_DROPPED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_index_bulk_dropped",
        "Number of documents dropped because the bulk buffer was full",
    )
    .expect("failed to initialise BULK_DROPPED counter")
});

/// Total number of bulk requests sent to the index.
pub static BULK_FLUSH_COUNT: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_index_bulk_flush_count",
        "Total number of bulk requests sent to the index",
    )
    .expect("failed to initialise BULK_FLUSH_COUNT counter")
});

/// Number of credential rotations performed after authentication failures.
pub static CREDENTIAL_ROTATIONS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_index_credential_rotations",
        "Number of credential rotations performed after authentication failures",
    )
    .expect("failed to initialise CREDENTIAL_ROTATIONS counter")
});

/// Total number of requests to the index.
pub static REQUEST_COUNT: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "breakglass_index_request_count",
            "Total number of requests to the index",
        ),
        &["op"],
    )
    .expect("failed to initialise REQUEST_COUNT counter")
});

/// Number of requests to the index that resulted in error.
pub static REQUEST_ERR: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "breakglass_index_request_error",
            "Number of requests to the index that resulted in error",
        ),
        &["op"],
    )
    .expect("failed to initialise REQUEST_ERR counter")
});

/// Ensure metrics are registered only once.
static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the index client metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    // Skip registration if already done before.
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    let collectors: [Box<dyn prometheus::core::Collector>; 6] = [
        Box::new(BULK_ITEM_ERR.clone()),
        Box::new(BULK_DROPPED.clone()),
        Box::new(BULK_FLUSH_COUNT.clone()),
        Box::new(CREDENTIAL_ROTATIONS.clone()),
        Box::new(REQUEST_COUNT.clone()),
        Box::new(REQUEST_ERR.clone()),
    ];
    for collector in collectors {
        reg.register(collector)?;
    }
    Ok(())
}
