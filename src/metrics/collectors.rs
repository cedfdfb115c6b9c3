//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until `init_metrics()` has run, so library code can
//! record unconditionally.

use std::time::Duration;

use super::prometheus::{
    ACTIVE_LOG_STREAMS, CONTAINER_OPERATIONS_TOTAL, ENGINE_LATENCY, HOST_PORTS_ALLOCATED,
    IMAGE_PULLS_TOTAL, LOG_LINES_FORWARDED, RECONCILE_CORRECTIONS_TOTAL,
};

/// Outcome label for a completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Rejected,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Rejected => "rejected",
            Outcome::Failure => "failure",
        }
    }
}

/// Metrics collector for recording sshbox operational metrics.
///
/// # Example
///
/// ```ignore
/// use sshbox::metrics::{init_metrics, MetricsCollector, Outcome};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
///
/// collector.record_operation("create", Outcome::Success);
/// collector.record_engine_call("start", Duration::from_millis(120));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a lifecycle operation (`create`, `start`, `stop`, `delete`, ...).
    pub fn record_operation(&self, operation: &str, outcome: Outcome) {
        if let Some(ops) = CONTAINER_OPERATIONS_TOTAL.get() {
            ops.with_label_values(&[operation, outcome.as_str()]).inc();
        }

        tracing::trace!(
            operation = operation,
            outcome = outcome.as_str(),
            "Recorded operation metric"
        );
    }

    /// Record the latency of one engine call.
    pub fn record_engine_call(&self, call: &str, elapsed: Duration) {
        if let Some(latency) = ENGINE_LATENCY.get() {
            latency
                .with_label_values(&[call])
                .observe(elapsed.as_secs_f64());
        }
    }

    /// Record an image pull (`success`, `failure` or `timeout`).
    pub fn record_image_pull(&self, outcome: &str) {
        if let Some(pulls) = IMAGE_PULLS_TOTAL.get() {
            pulls.with_label_values(&[outcome]).inc();
        }
    }

    /// Record that reconciliation changed a stored status.
    pub fn record_reconcile_correction(&self, new_status: &str) {
        if let Some(corrections) = RECONCILE_CORRECTIONS_TOTAL.get() {
            corrections.with_label_values(&[new_status]).inc();
        }
    }

    pub fn inc_log_streams(&self) {
        if let Some(gauge) = ACTIVE_LOG_STREAMS.get() {
            gauge.inc();
        }
    }

    pub fn dec_log_streams(&self) {
        if let Some(gauge) = ACTIVE_LOG_STREAMS.get() {
            gauge.dec();
        }
    }

    pub fn record_log_line(&self) {
        if let Some(counter) = LOG_LINES_FORWARDED.get() {
            counter.inc();
        }
    }

    /// Set the number of host ports in use.
    pub fn update_allocated_ports(&self, count: usize) {
        if let Some(gauge) = HOST_PORTS_ALLOCATED.get() {
            gauge.set(count as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::init_metrics;

    fn ensure_metrics_init() {
        let _ = init_metrics();
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Rejected.as_str(), "rejected");
        assert_eq!(Outcome::Failure.as_str(), "failure");
    }

    #[test]
    fn test_record_operation() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_operation("start", Outcome::Success);

        let value = CONTAINER_OPERATIONS_TOTAL
            .get()
            .map(|ops| ops.with_label_values(&["start", "success"]).get())
            .unwrap_or_default();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_record_engine_call_and_pull() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.record_engine_call("inspect", Duration::from_millis(5));
        collector.record_image_pull("timeout");
        collector.record_reconcile_correction("dead");
        collector.record_log_line();
    }

    #[test]
    fn test_allocated_ports_gauge() {
        ensure_metrics_init();
        let collector = MetricsCollector::new();

        collector.update_allocated_ports(3);
        let exported = crate::metrics::export_metrics();
        assert!(exported.contains("sshbox_host_ports_allocated"));
    }
}
