//! Observability: runtime telemetry (metrics) and sink abstractions.

pub(crate) mod metrics;
pub(crate) mod sink;
mod stats;

// re-exports
pub use metrics::{ClassCounters, MetricsOps, MetricsPerf, MetricsReport, MetricsState};
pub use sink::{
    GlobalMetricsSink, MetricsEvent, MetricsSink, NoopMetricsSink, SaveKind, metrics_report,
    metrics_reset_all,
};
pub use stats::TransactionStats;
