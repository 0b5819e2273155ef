use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref TOKENS_CREATED: IntCounter = IntCounter::new(
        "wallet_tokens_created_total",
        "Total transfer tokens minted"
    ).expect("metric can be created");

    pub static ref TOKENS_CLAIMED: IntCounter = IntCounter::new(
        "wallet_tokens_claimed_total",
        "Total transfer tokens redeemed"
    ).expect("metric can be created");

    pub static ref OPERATIONS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("wallet_operations_rejected_total", "Rejected state-changing operations"),
        &["operation", "reason"]
    ).expect("metric can be created");

    pub static ref DEPOSITS: IntCounter = IntCounter::new(
        "wallet_deposits_total",
        "Total deposits credited"
    ).expect("metric can be created");

    pub static ref TRANSFER_AMOUNT: Histogram = Histogram::with_opts(
        HistogramOpts::new("wallet_transfer_amount", "Distribution of transfer amounts in minor units")
            .buckets(vec![100.0, 1000.0, 10000.0, 100000.0, 1000000.0, 10000000.0])
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(TOKENS_CREATED.clone()))?;
    registry.register(Box::new(TOKENS_CLAIMED.clone()))?;
    registry.register(Box::new(OPERATIONS_REJECTED.clone()))?;
    registry.register(Box::new(DEPOSITS.clone()))?;
    registry.register(Box::new(TRANSFER_AMOUNT.clone()))?;
    Ok(())
}

pub fn record_rejection(operation: &str, reason: &str) {
    OPERATIONS_REJECTED.with_label_values(&[operation, reason]).inc();
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
