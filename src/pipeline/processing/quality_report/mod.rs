use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_REPORTED_ERRORS;
use crate::pipeline::processing::normalize::MissingValues;
use crate::pipeline::processing::validate::NumericCoercion;

/// One rejected record in the quality report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub record_index: usize,
    pub vin: String,
    pub error: String,
}

/// Data quality summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    /// Field -> rows where the value was missing before defaults were applied
    pub missing_values: MissingValues,
    /// First failures only; see `MAX_REPORTED_ERRORS`
    pub validation_errors: Vec<RecordError>,
    /// Field -> unparsable numeric values coerced to 0
    pub numeric_coercions: BTreeMap<String, usize>,
    pub processed_at: DateTime<Utc>,
}

impl QualityReport {
    /// Share of records accepted, 0.0 for an empty run
    pub fn acceptance_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.valid_records as f64 / self.total_records as f64
        }
    }
}

/// Single-use accumulator for a run's quality report
#[derive(Debug)]
pub struct QualityReporter {
    valid: usize,
    invalid: usize,
    missing_values: MissingValues,
    errors: Vec<RecordError>,
    numeric_coercions: BTreeMap<String, usize>,
}

impl QualityReporter {
    pub fn new(missing_values: MissingValues) -> Self {
        Self {
            valid: 0,
            invalid: 0,
            missing_values,
            errors: Vec::new(),
            numeric_coercions: BTreeMap::new(),
        }
    }

    pub fn record_valid(&mut self, coercions: &[NumericCoercion]) {
        self.valid += 1;
        for coercion in coercions {
            *self
                .numeric_coercions
                .entry(coercion.field.clone())
                .or_insert(0) += 1;
        }
    }

    pub fn record_invalid(&mut self, record_index: usize, vin: impl Into<String>, error: impl Into<String>) {
        self.invalid += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(RecordError {
                record_index,
                vin: vin.into(),
                error: error.into(),
            });
        }
    }

    pub fn valid(&self) -> usize {
        self.valid
    }

    pub fn invalid(&self) -> usize {
        self.invalid
    }

    pub fn finish(self) -> QualityReport {
        QualityReport {
            total_records: self.valid + self.invalid,
            valid_records: self.valid,
            invalid_records: self.invalid,
            missing_values: self.missing_values,
            validation_errors: self.errors,
            numeric_coercions: self.numeric_coercions,
            processed_at: Utc::now(),
        }
    }
}
