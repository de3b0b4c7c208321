//! Ingestion pipeline metrics: extraction, validation and load phases.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics for reading the source extract
pub struct ExtractionMetrics;

impl ExtractionMetrics {
    pub fn record_extracted(rows: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "extraction", "rows")).increment(rows as u64);
        ::metrics::histogram!(phase_metric!(histogram, "extraction", "duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_failure() {
        ::metrics::counter!(phase_metric!(counter, "extraction", "failures")).increment(1);
    }
}

impl PhaseMetrics for ExtractionMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "extraction", "rows"));
        let _ = ::metrics::counter!(phase_metric!(counter, "extraction", "failures"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "extraction", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "extraction"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "extraction", "rows"),
                metric_type: MetricType::Counter,
                help: "Rows read from the source extract",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "extraction", "failures"),
                metric_type: MetricType::Counter,
                help: "Extractions that failed (unreadable or empty source)",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "extraction", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent reading the source extract",
                labels: vec![],
            },
        ]
    }
}

/// Metrics for per-record validation
pub struct ValidationMetrics;

impl ValidationMetrics {
    pub fn record_outcome(valid: usize, invalid: usize) {
        ::metrics::counter!(phase_metric!(counter, "validation", "valid_records"))
            .increment(valid as u64);
        ::metrics::counter!(phase_metric!(counter, "validation", "invalid_records"))
            .increment(invalid as u64);
    }

    /// An unparsable numeric cell silently became 0
    pub fn record_numeric_coercion(field: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "validation", "numeric_coercions"),
            "field" => field.to_string()
        )
        .increment(1);
    }

    /// A vehicle type label matched neither BEV nor PHEV
    pub fn record_vehicle_type_passthrough() {
        ::metrics::counter!(phase_metric!(counter, "validation", "vehicle_type_passthrough"))
            .increment(1);
    }
}

impl PhaseMetrics for ValidationMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "validation", "valid_records"));
        let _ = ::metrics::counter!(phase_metric!(counter, "validation", "invalid_records"));
        let _ = ::metrics::counter!(phase_metric!(counter, "validation", "vehicle_type_passthrough"));
    }

    fn phase_name() -> &'static str {
        "validation"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "validation", "valid_records"),
                metric_type: MetricType::Counter,
                help: "Records accepted by the validator",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "validation", "invalid_records"),
                metric_type: MetricType::Counter,
                help: "Records rejected by the validator",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "validation", "numeric_coercions"),
                metric_type: MetricType::Counter,
                help: "Unparsable numeric values coerced to 0",
                labels: vec!["field"],
            },
            MetricDoc {
                name: phase_metric!(counter, "validation", "vehicle_type_passthrough"),
                metric_type: MetricType::Counter,
                help: "Vehicle type labels left unchanged because they matched no known type",
                labels: vec![],
            },
        ]
    }
}

/// Metrics for batched writes and index builds
pub struct LoadMetrics;

impl LoadMetrics {
    pub fn record_batch(inserted: usize, failed: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "load", "batches")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "load", "documents_inserted"))
            .increment(inserted as u64);
        ::metrics::counter!(phase_metric!(counter, "load", "document_write_errors"))
            .increment(failed as u64);
        ::metrics::histogram!(phase_metric!(histogram, "load", "batch_duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_index_build(duration_secs: f64) {
        ::metrics::histogram!(phase_metric!(histogram, "load", "index_build_duration_seconds"))
            .record(duration_secs);
    }
}

impl PhaseMetrics for LoadMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "load", "batches"));
        let _ = ::metrics::counter!(phase_metric!(counter, "load", "documents_inserted"));
        let _ = ::metrics::counter!(phase_metric!(counter, "load", "document_write_errors"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "load", "batch_duration_seconds"));
        let _ = ::metrics::histogram!(phase_metric!(
            histogram,
            "load",
            "index_build_duration_seconds"
        ));
    }

    fn phase_name() -> &'static str {
        "load"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "load", "batches"),
                metric_type: MetricType::Counter,
                help: "Insert batches written",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "documents_inserted"),
                metric_type: MetricType::Counter,
                help: "Documents persisted",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "document_write_errors"),
                metric_type: MetricType::Counter,
                help: "Documents rejected by the store inside an otherwise successful batch",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "load", "batch_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent writing one batch",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "load", "index_build_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent (re)building the index set",
                labels: vec![],
            },
        ]
    }
}
