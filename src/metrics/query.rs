//! Query engine metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct QueryMetrics;

impl QueryMetrics {
    /// `outcome` is one of "ok", "not_found", "error"
    pub fn record_query(operation: &'static str, duration_secs: f64, outcome: &'static str) {
        ::metrics::counter!(
            phase_metric!(counter, "query", "requests"),
            "operation" => operation,
            "outcome" => outcome
        )
        .increment(1);
        ::metrics::histogram!(
            phase_metric!(histogram, "query", "duration_seconds"),
            "operation" => operation
        )
        .record(duration_secs);
    }
}

impl PhaseMetrics for QueryMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "query", "requests"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "query", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "query"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "query", "requests"),
                metric_type: MetricType::Counter,
                help: "Analytics queries served",
                labels: vec!["operation", "outcome"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "query", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Analytics query latency",
                labels: vec!["operation"],
            },
        ]
    }
}
