//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Completion API metrics
    pub completion_requests: CounterVec,
    pub completion_duration: HistogramVec,
    pub operation_polls: Counter,
    pub request_tokens: Histogram,

    // Tokenizer / auth metrics
    pub tokenize_requests: CounterVec,
    pub iam_exchanges: CounterVec,

    // Prompt metrics
    pub prompts_rejected: Counter,

    // Context management metrics
    pub context_evictions: CounterVec,
    pub cache_failures: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let completion_requests = register_counter_vec_with_registry!(
            Opts::new("completion_requests_total", "Total completion requests"),
            &["mode", "status"],
            registry
        )?;

        let completion_duration = register_histogram_vec_with_registry!(
            "completion_request_duration_seconds",
            "Completion request duration in seconds, polling included",
            &["mode"],
            registry
        )?;

        let operation_polls = register_counter_with_registry!(
            Opts::new("completion_operation_polls_total", "Total async operation status polls"),
            registry
        )?;

        let request_tokens = register_histogram_with_registry!(
            HistogramOpts::new("completion_request_tokens", "System plus context tokens per request")
                .buckets(vec![100.0, 500.0, 1000.0, 2000.0, 4000.0, 6000.0, 8000.0]),
            registry
        )?;

        let tokenize_requests = register_counter_vec_with_registry!(
            Opts::new("tokenize_requests_total", "Total remote tokenize requests"),
            &["status"],
            registry
        )?;

        let iam_exchanges = register_counter_vec_with_registry!(
            Opts::new("iam_token_exchanges_total", "Total IAM token exchanges"),
            &["status"],
            registry
        )?;

        let prompts_rejected = register_counter_with_registry!(
            Opts::new("prompts_rejected_total", "Prompts that were empty after cleaning"),
            registry
        )?;

        let context_evictions = register_counter_vec_with_registry!(
            Opts::new("context_evictions_total", "Turns evicted from session context"),
            &["reason"],
            registry
        )?;

        let cache_failures = register_counter_vec_with_registry!(
            Opts::new("cache_failures_total", "Cache operations that failed and were degraded"),
            &["operation"],
            registry
        )?;

        Ok(Self {
            registry,
            completion_requests,
            completion_duration,
            operation_polls,
            request_tokens,
            tokenize_requests,
            iam_exchanges,
            prompts_rejected,
            context_evictions,
            cache_failures,
        })
    }

    /// Record a finished completion request
    pub fn record_completion(&self, mode: &str, success: bool, seconds: f64) {
        let status = if success { "success" } else { "error" };
        self.completion_requests.with_label_values(&[mode, status]).inc();
        self.completion_duration.with_label_values(&[mode]).observe(seconds);
    }

    /// Record a remote tokenize call
    pub fn record_tokenize(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.tokenize_requests.with_label_values(&[status]).inc();
    }

    /// Record an IAM token exchange
    pub fn record_iam_exchange(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.iam_exchanges.with_label_values(&[status]).inc();
    }

    /// Record evicted turns by cause (`count` or `tokens`)
    pub fn record_evictions(&self, reason: &str, turns: usize) {
        if turns > 0 {
            self.context_evictions
                .with_label_values(&[reason])
                .inc_by(turns as f64);
        }
    }

    /// Record a degraded cache operation
    pub fn record_cache_failure(&self, operation: &str) {
        self.cache_failures.with_label_values(&[operation]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_completion() {
        let metrics = Metrics::new().unwrap();
        metrics.record_completion("sync", true, 0.4);
        metrics.record_completion("async", false, 60.0);

        let exported = metrics.export_prometheus();
        assert!(exported.contains("completion_requests_total"));
        assert!(exported.contains("mode=\"async\""));
    }

    #[test]
    fn test_global_export_includes_recorded_metrics() {
        METRICS.record_iam_exchange(true);
        METRICS.record_cache_failure("set");

        let exported = METRICS.export_prometheus();
        assert!(exported.contains("iam_token_exchanges_total"));
        assert!(exported.contains("cache_failures_total{operation=\"set\"}"));
    }

    #[test]
    fn test_record_evictions_skips_zero() {
        let metrics = Metrics::new().unwrap();
        metrics.record_evictions("count", 0);
        metrics.record_evictions("tokens", 2);

        assert_eq!(metrics.context_evictions.with_label_values(&["tokens"]).get(), 2.0);
        assert_eq!(metrics.context_evictions.with_label_values(&["count"]).get(), 0.0);
    }
}
