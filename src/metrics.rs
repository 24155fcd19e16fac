/// Prometheus metrics
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Generation attempts by scenario and outcome
    /// (ok | quota | moderation | provider_error | validation)
    pub static ref GENERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "copymint_generations_total",
        "Content generation attempts",
        &["scenario", "outcome"]
    )
    .unwrap();

    /// Quota refunds issued by the generation pipeline, by failing stage
    pub static ref QUOTA_REFUNDS_TOTAL: CounterVec = register_counter_vec!(
        "copymint_quota_refunds_total",
        "Quota refunds after failed generations",
        &["stage"]
    )
    .unwrap();

    /// Payment notifications by outcome
    /// (paid | duplicate | bad_signature | failed | error)
    pub static ref PAYMENT_NOTIFY_TOTAL: CounterVec = register_counter_vec!(
        "copymint_payment_notify_total",
        "Payment gateway notifications",
        &["outcome"]
    )
    .unwrap();

    /// Generation latency by provider
    pub static ref GENERATION_SECONDS: HistogramVec = register_histogram_vec!(
        "copymint_generation_seconds",
        "Generation latency",
        &["provider"],
        vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0]
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        GENERATIONS_TOTAL
            .with_label_values(&["product-intro", "ok"])
            .inc();
        let output = render();
        assert!(output.contains("copymint_generations_total"));
    }
}
