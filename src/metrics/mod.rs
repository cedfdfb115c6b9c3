//! Prometheus metrics for the container service.
//!
//! [`prometheus`] owns the registry and the metric statics; [`collectors`]
//! wraps them behind [`MetricsCollector`] so call sites never touch a label
//! vector directly. `init_metrics` must run once before the first export; the
//! collector silently skips recording until it has.

pub mod collectors;
pub mod prometheus;

pub use collectors::{MetricsCollector, Outcome};
pub use prometheus::{export_metrics, init_metrics, metrics_handler};
