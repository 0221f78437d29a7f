//! Telemetry for the resource authorisation cache.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::CounterVec;
use prometheus::Opts;

pub static CACHE_HIT: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_resauth_cache_hit",
        "Number of resource authorisation decisions served from the cache",
    )
    .expect("failed to initialise CACHE_HIT counter")
});

pub static CACHE_MISS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_resauth_cache_miss",
        "Number of resource authorisation decisions not found in the cache",
    )
    .expect("failed to initialise CACHE_MISS counter")
});

pub static CACHE_REFUSED: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "breakglass_resauth_cache_refused",
            "Number of cache inserts refused because a table was full",
        ),
        &["table"],
    )
    .expect("failed to initialise CACHE_REFUSED counter")
});

pub static IAM_TOKEN_ERR: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_resauth_iam_token_error",
        "Number of failed IAM token exchanges",
    )
    .expect("failed to initialise IAM_TOKEN_ERR counter")
});

pub static IAM_TOKEN_FETCH: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_resauth_iam_token_fetch",
        "Number of IAM token exchanges performed",
    )
    .expect("failed to initialise IAM_TOKEN_FETCH counter")
});

pub static POLICY_CALLS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_resauth_policy_calls",
        "Number of batched requests to the policy service",
    )
    .expect("failed to initialise POLICY_CALLS counter")
});

pub static POLICY_ERR: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_resauth_policy_error",
        "Number of failed requests to the policy service",
    )
    .expect("failed to initialise POLICY_ERR counter")
});

pub static SWEPT: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "breakglass_resauth_swept",
        "Number of expired entries removed from the cache",
    )
    .expect("failed to initialise SWEPT counter")
});

/// Ensure metrics are registered only once.
static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the resource authorisation metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    // Skip registration if already done before.
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }
    reg.register(Box::new(CACHE_HIT.clone()))?;
    reg.register(Box::new(CACHE_MISS.clone()))?;
    reg.register(Box::new(CACHE_REFUSED.clone()))?;
    reg.register(Box::new(IAM_TOKEN_ERR.clone()))?;
    reg.register(Box::new(IAM_TOKEN_FETCH.clone()))?;
    reg.register(Box::new(POLICY_CALLS.clone()))?;
    reg.register(Box::new(POLICY_ERR.clone()))?;
    reg.register(Box::new(SWEPT.clone()))?;
    Ok(())
}
