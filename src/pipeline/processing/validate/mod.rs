use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::constants::{
    BASE_MSRP, BEV_CODE, BEV_LABEL, CAFV_ELIGIBILITY, CENSUS_TRACT_2020, CITY, COUNTY,
    DEFAULT_STATE, DOL_VEHICLE_ID, ELECTRIC_RANGE, ELECTRIC_UTILITY, ELECTRIC_VEHICLE_TYPE,
    LEGISLATIVE_DISTRICT, MAKE, MAX_MODEL_YEAR, MIN_MODEL_YEAR, MODEL, MODEL_YEAR,
    NUMERIC_SENTINELS, PHEV_CODE, PHEV_LABEL, POSTAL_CODE, STATE, VEHICLE_LOCATION, VIN_1_10,
};
use crate::domain::{canonicalize, ValidatedVehicle};
use crate::metrics::ValidationMetrics;
use crate::pipeline::processing::normalize::{number_text, NormalizedRecord};

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldError {
    Missing { field: String },
    Invalid { field: String, reason: String },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Missing { field } => write!(f, "{field}: field required"),
            FieldError::Invalid { field, reason } => write!(f, "{field}: {reason}"),
        }
    }
}

/// Every field failure found in one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// A numeric cell that could not be parsed and was coerced to zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericCoercion {
    pub field: String,
    pub raw: String,
}

/// Successful validation plus the lenient coercions applied on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub vehicle: ValidatedVehicle,
    pub coercions: Vec<NumericCoercion>,
}

/// Validate a normalized record into a typed vehicle
pub fn validate(record: &NormalizedRecord) -> Result<ValidatedVehicle, ValidationError> {
    validate_detailed(record).map(|validated| validated.vehicle)
}

/// Like [`validate`], also reporting numeric coercions
pub fn validate_detailed(record: &NormalizedRecord) -> Result<Validated, ValidationError> {
    let mut errors = Vec::new();
    let mut coercions = Vec::new();

    let vin_1_10 = required_text(record, VIN_1_10, &mut errors);
    let county = canonicalize(&required_text(record, COUNTY, &mut errors));
    let city = canonicalize(&required_text(record, CITY, &mut errors));
    let make = canonicalize(&required_text(record, MAKE, &mut errors));
    let model = canonicalize(&required_text(record, MODEL, &mut errors));
    let vehicle_type = canonicalize(&required_text(record, ELECTRIC_VEHICLE_TYPE, &mut errors));
    let cafv_eligibility = required_text(record, CAFV_ELIGIBILITY, &mut errors);
    let dol_vehicle_id = required_text(record, DOL_VEHICLE_ID, &mut errors);

    let model_year = match parse_model_year(record.get(MODEL_YEAR)) {
        Ok(year) => year,
        Err(e) => {
            errors.push(e);
            0
        }
    };

    let electric_range = lenient_count(record, ELECTRIC_RANGE, &mut errors, &mut coercions);
    let base_msrp = lenient_count(record, BASE_MSRP, &mut errors, &mut coercions);

    if !errors.is_empty() {
        return Err(ValidationError { errors });
    }

    let state = optional_text(record.get(STATE))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STATE.to_string());

    let vehicle = ValidatedVehicle {
        vin_1_10,
        county,
        city,
        state,
        postal_code: optional_text(record.get(POSTAL_CODE)),
        model_year,
        make,
        model,
        electric_vehicle_type: canonical_vehicle_type(vehicle_type),
        cafv_eligibility,
        electric_range,
        base_msrp,
        legislative_district: optional_text(record.get(LEGISLATIVE_DISTRICT)),
        dol_vehicle_id,
        vehicle_location: optional_text(record.get(VEHICLE_LOCATION)),
        electric_utility: optional_text(record.get(ELECTRIC_UTILITY)),
        census_tract_2020: optional_text(record.get(CENSUS_TRACT_2020)),
    };

    Ok(Validated { vehicle, coercions })
}

/// Map free-form type labels onto the two canonical long labels.
///
/// Values that are already canonical (long label or short code) are kept;
/// unrecognized labels pass through unchanged.
pub fn canonical_vehicle_type(upper: String) -> String {
    if [BEV_LABEL, PHEV_LABEL, BEV_CODE, PHEV_CODE].contains(&upper.as_str()) {
        return upper;
    }
    if upper.contains(BEV_CODE) {
        BEV_LABEL.to_string()
    } else if upper.contains(PHEV_CODE) {
        PHEV_LABEL.to_string()
    } else {
        debug!(vehicle_type = %upper, "Unrecognized vehicle type passed through");
        ValidationMetrics::record_vehicle_type_passthrough();
        upper
    }
}

fn text_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn required_text(record: &NormalizedRecord, field: &str, errors: &mut Vec<FieldError>) -> String {
    match text_value(record.get(field)) {
        Some(text) if !text.is_empty() => text,
        _ => {
            errors.push(FieldError::Missing {
                field: field.to_string(),
            });
            String::new()
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> FieldError {
    FieldError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn whole_number(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

fn parse_model_year(value: Option<&Value>) -> Result<i32, FieldError> {
    let year = match value {
        None | Some(Value::Null) => {
            return Err(FieldError::Missing {
                field: MODEL_YEAR.to_string(),
            })
        }
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole_number))
            .ok_or_else(|| invalid(MODEL_YEAR, format!("not a whole number: {n}")))?,
        Some(Value::String(s)) => {
            let text = s.trim();
            if text.is_empty() {
                return Err(FieldError::Missing {
                    field: MODEL_YEAR.to_string(),
                });
            }
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(whole_number))
                .ok_or_else(|| invalid(MODEL_YEAR, format!("not an integer: '{text}'")))?
        }
        Some(other) => return Err(invalid(MODEL_YEAR, format!("not an integer: {other}"))),
    };

    if year < i64::from(MIN_MODEL_YEAR) || year > i64::from(MAX_MODEL_YEAR) {
        return Err(invalid(
            MODEL_YEAR,
            format!("must be between {MIN_MODEL_YEAR} and {MAX_MODEL_YEAR}, got {year}"),
        ));
    }
    Ok(year as i32)
}

enum Coerced {
    Number(f64),
    Sentinel,
    Unparsable(String),
}

fn coerce_number(value: Option<&Value>) -> Coerced {
    match value {
        None | Some(Value::Null) => Coerced::Sentinel,
        Some(Value::String(s)) => {
            let text = s.trim();
            if NUMERIC_SENTINELS.contains(&text) {
                return Coerced::Sentinel;
            }
            match text.parse::<f64>() {
                Ok(f) if f.is_finite() => Coerced::Number(f),
                _ => Coerced::Unparsable(text.to_string()),
            }
        }
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() => Coerced::Number(f),
            _ => Coerced::Unparsable(n.to_string()),
        },
        Some(other) => Coerced::Unparsable(other.to_string()),
    }
}

/// Lenient non-negative integer: sentinels and garbage become 0, fractions truncate
fn lenient_count(
    record: &NormalizedRecord,
    field: &str,
    errors: &mut Vec<FieldError>,
    coercions: &mut Vec<NumericCoercion>,
) -> u32 {
    let number = match coerce_number(record.get(field)) {
        Coerced::Number(f) => f.trunc(),
        Coerced::Sentinel => 0.0,
        Coerced::Unparsable(raw) => {
            debug!(field, raw = %raw, "Unparsable numeric value coerced to 0");
            ValidationMetrics::record_numeric_coercion(field);
            coercions.push(NumericCoercion {
                field: field.to_string(),
                raw,
            });
            0.0
        }
    };

    if number < 0.0 {
        errors.push(invalid(
            field,
            format!("must be greater than or equal to 0, got {number}"),
        ));
        return 0;
    }
    if number > f64::from(u32::MAX) {
        errors.push(invalid(
            field,
            format!("must be at most {}, got {number}", u32::MAX),
        ));
        return 0;
    }
    number as u32
}
