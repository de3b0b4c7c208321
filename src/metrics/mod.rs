//! Metrics for the ingestion pipeline and the query engine.
//!
//! Each phase owns a metrics struct in its own submodule. Recording is always
//! safe: without an installed recorder the `metrics` macros are no-ops, so
//! library code and tests never need to initialize anything.

pub mod pipeline;
pub mod query;

pub use pipeline::{ExtractionMetrics, LoadMetrics, ValidationMetrics};
pub use query::QueryMetrics;

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Install the Prometheus exporter on `addr` and register every phase metric.
///
/// Idempotent; later calls are ignored.
pub fn init_metrics(addr: SocketAddr) {
    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => {
                info!("Prometheus exporter listening on http://{}/metrics", addr);
                register_all_metrics();
            }
            Err(e) => {
                warn!("Failed to install Prometheus exporter: {}", e);
            }
        }
    });
}

/// Pre-register all phase metrics so they show up before first use
pub fn register_all_metrics() {
    ExtractionMetrics::register_metrics();
    ValidationMetrics::register_metrics();
    LoadMetrics::register_metrics();
    QueryMetrics::register_metrics();
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Phase name used as the metric prefix
    fn phase_name() -> &'static str;

    /// Documentation for every metric in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Phase-specific metric names: ev_{phase}_{name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("ev_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("ev_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
