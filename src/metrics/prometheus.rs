//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by sshbox and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all sshbox metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Lifecycle operations, labeled by operation and outcome.
pub static CONTAINER_OPERATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Engine call latency in seconds, labeled by call.
pub static ENGINE_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Image pulls, labeled by outcome (success, failure, timeout).
pub static IMAGE_PULLS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Records whose stored status was corrected by reconciliation, labeled by new status.
pub static RECONCILE_CORRECTIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Following log streams currently attached.
pub static ACTIVE_LOG_STREAMS: OnceLock<Gauge> = OnceLock::new();

/// Log lines forwarded to websocket clients.
pub static LOG_LINES_FORWARDED: OnceLock<Counter> = OnceLock::new();

/// Host ports held by records after the last allocation.
pub static HOST_PORTS_ALLOCATED: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls build a fresh registry but leave the
/// already-installed statics in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let container_operations_total = CounterVec::new(
        Opts::new(
            "sshbox_container_operations_total",
            "Total container lifecycle operations",
        ),
        &["operation", "outcome"],
    )?;

    let engine_latency = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "sshbox_engine_latency_seconds",
            "Container engine call latency in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["call"],
    )?;

    let image_pulls_total = CounterVec::new(
        Opts::new("sshbox_image_pulls_total", "Total image pulls"),
        &["outcome"],
    )?;

    let reconcile_corrections_total = CounterVec::new(
        Opts::new(
            "sshbox_reconcile_corrections_total",
            "Stored statuses corrected from the engine",
        ),
        &["status"],
    )?;

    let active_log_streams = Gauge::new(
        "sshbox_active_log_streams",
        "Following log streams currently attached",
    )?;

    let log_lines_forwarded = Counter::new(
        "sshbox_log_lines_forwarded_total",
        "Log lines forwarded to streaming clients",
    )?;

    let host_ports_allocated = Gauge::new(
        "sshbox_host_ports_allocated",
        "Host ports referenced by container records",
    )?;

    registry.register(Box::new(container_operations_total.clone()))?;
    registry.register(Box::new(engine_latency.clone()))?;
    registry.register(Box::new(image_pulls_total.clone()))?;
    registry.register(Box::new(reconcile_corrections_total.clone()))?;
    registry.register(Box::new(active_log_streams.clone()))?;
    registry.register(Box::new(log_lines_forwarded.clone()))?;
    registry.register(Box::new(host_ports_allocated.clone()))?;

    // Already-set statics mean a previous init won; ignore.
    let _ = REGISTRY.set(registry);
    let _ = CONTAINER_OPERATIONS_TOTAL.set(container_operations_total);
    let _ = ENGINE_LATENCY.set(engine_latency);
    let _ = IMAGE_PULLS_TOTAL.set(image_pulls_total);
    let _ = RECONCILE_CORRECTIONS_TOTAL.set(reconcile_corrections_total);
    let _ = ACTIVE_LOG_STREAMS.set(active_log_streams);
    let _ = LOG_LINES_FORWARDED.set(log_lines_forwarded);
    let _ = HOST_PORTS_ALLOCATED.set(host_ports_allocated);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, the returned
/// text is a single comment line describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// Handler body for the `/metrics` route.
pub async fn metrics_handler() -> String {
    export_metrics()
}
