// Record processing: normalization, validation and quality reporting

pub mod normalize;
pub mod quality_report;
pub mod validate;

use serde_json::Value;
use tracing::{debug, info};

use crate::constants::{PROGRESS_LOG_INTERVAL, UNKNOWN_VIN, VIN_1_10};
use crate::domain::ValidatedVehicle;
use crate::metrics::ValidationMetrics;
use normalize::{RawRecord, VehicleNormalizer};
use quality_report::{QualityReport, QualityReporter};

/// Normalize and validate every extracted row.
///
/// Returns the accepted vehicles and the run's quality report; rejected rows
/// only show up in the report.
pub fn transform(rows: &[RawRecord]) -> (Vec<ValidatedVehicle>, QualityReport) {
    info!("Starting data transformation and validation");

    let batch = VehicleNormalizer::new().normalize_batch(rows);
    let total = batch.records.len();
    info!("Validating {} records...", total);

    let mut reporter = QualityReporter::new(batch.missing_values);
    let mut vehicles = Vec::with_capacity(total);

    for (idx, record) in batch.records.iter().enumerate() {
        match validate::validate_detailed(record) {
            Ok(validated) => {
                reporter.record_valid(&validated.coercions);
                vehicles.push(validated.vehicle);
            }
            Err(e) => {
                let vin = match record.get(VIN_1_10) {
                    Some(Value::String(s)) => s.clone(),
                    _ => UNKNOWN_VIN.to_string(),
                };
                debug!(record_index = idx, vin = %vin, "Record rejected: {}", e);
                reporter.record_invalid(idx, vin, e.to_string());
            }
        }

        if (idx + 1) % PROGRESS_LOG_INTERVAL == 0 {
            info!("Validated {}/{} records", idx + 1, total);
        }
    }

    ValidationMetrics::record_outcome(reporter.valid(), reporter.invalid());
    let report = reporter.finish();
    info!(
        "Validation complete: {} valid, {} invalid",
        report.valid_records, report.invalid_records
    );

    (vehicles, report)
}
