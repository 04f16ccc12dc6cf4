// Prometheus metrics for the storefront rate limiter
//
// - Decisions per category and outcome (counter)
// - Violations per category (counter)
// - Tracked (actor, category) keys (gauge)
// - Keys dropped by the idle sweeper (counter)
// - Payments flagged as suspicious (counter)

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref RATE_LIMIT_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_decisions_total", "Rate limit checks by category and outcome"),
        &["category", "outcome"]
    ).expect("Failed to create rate limit decisions metric");

    pub static ref RATE_LIMIT_VIOLATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("rate_limit_violations_total", "Rejected attempts by category"),
        &["category"]
    ).expect("Failed to create rate limit violations metric");

    pub static ref RATE_LIMIT_TRACKED_KEYS: IntGauge = IntGauge::new(
        "rate_limit_tracked_keys",
        "Number of (actor, category) keys held in memory"
    ).expect("Failed to create tracked keys metric");

    pub static ref RATE_LIMIT_SWEPT_KEYS_TOTAL: IntCounter = IntCounter::new(
        "rate_limit_swept_keys_total",
        "Total number of idle keys removed by the sweeper"
    ).expect("Failed to create swept keys metric");

    pub static ref SUSPICIOUS_PAYMENT_ACTIVITY_TOTAL: IntCounter = IntCounter::new(
        "suspicious_payment_activity_total",
        "Total number of payment attempts flagged as suspicious"
    ).expect("Failed to create suspicious payment metric");
}

/// Initialize metrics registry - must be called once at startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(RATE_LIMIT_DECISIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_VIOLATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_TRACKED_KEYS.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_SWEPT_KEYS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUSPICIOUS_PAYMENT_ACTIVITY_TOTAL.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
