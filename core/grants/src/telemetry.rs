//! Telemetry for the grants cache.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::CounterVec;
use prometheus::Opts;

pub static BOOTSTRAP_RESTORED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_grants_bootstrap_restored",
        "Number of grants restored from the index during bootstrap",
    )
    .expect("failed to initialise BOOTSTRAP_RESTORED counter")
});

pub static BOOTSTRAP_SKIPPED: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "breakglass_grants_bootstrap_skipped",
            "Number of index records skipped during bootstrap",
        ),
        &["reason"],
    )
    .expect("failed to initialise BOOTSTRAP_SKIPPED counter")
});

pub static PERSIST_ERR: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_grants_persist_error",
        "Number of grant snapshots that failed to build or submit",
    )
    .expect("failed to initialise PERSIST_ERR counter")
});

pub static WRITE_THROUGH: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_grants_write_through",
        "Number of grant snapshots submitted for bulk indexing",
    )
    .expect("failed to initialise WRITE_THROUGH counter")
});

/// Ensure metrics are registered only once.
static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the grants metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    // Skip registration if already done before.
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }
    reg.register(Box::new(BOOTSTRAP_RESTORED.clone()))?;
    reg.register(Box::new(BOOTSTRAP_SKIPPED.clone()))?;
    reg.register(Box::new(PERSIST_ERR.clone()))?;
    reg.register(Box::new(WRITE_THROUGH.clone()))?;
    Ok(())
}
