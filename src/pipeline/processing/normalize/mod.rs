use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::constants::{
    canonical_field, canonical_fields, IDENTIFIER_FIELDS, MISSING_SENTINELS,
    NUMERIC_DEFAULT_FIELDS, TEXT_DEFAULT_FIELDS,
};

/// One source row: column header -> untyped cell value
pub type RawRecord = serde_json::Map<String, Value>;

/// Canonical field -> number of rows where it was originally missing
pub type MissingValues = BTreeMap<String, usize>;

/// A row renamed to canonical fields with defaults applied.
///
/// Always carries exactly the canonical field set; fields without a value
/// and without a default hold `Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    fields: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Back to a raw row keyed by canonical names
    pub fn into_raw(self) -> RawRecord {
        self.fields.into_iter().collect()
    }
}

/// Normalized rows of one extract plus the missing-value histogram
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedRecord>,
    pub missing_values: MissingValues,
}

/// Trait for normalizing raw source rows into canonical records
pub trait Normalizer {
    fn normalize(&self, record: &RawRecord) -> NormalizedRecord;
}

/// Normalizer for the vehicle registration extract
#[derive(Debug, Default, Clone)]
pub struct VehicleNormalizer;

impl VehicleNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a row and report which canonical fields were originally missing
    pub fn normalize_tracking_missing(&self, record: &RawRecord) -> (NormalizedRecord, Vec<&'static str>) {
        let mut renamed: BTreeMap<&'static str, &Value> = BTreeMap::new();
        for (header, value) in record {
            match canonical_field(header) {
                Some(field) => {
                    renamed.insert(field, value);
                }
                None => debug!(header = %header, "Dropping unmapped column"),
            }
        }

        let mut missing = Vec::new();
        let mut fields = BTreeMap::new();
        for field in canonical_fields() {
            let value = match renamed.get(field) {
                Some(value) if !is_missing(value) => (*value).clone(),
                _ => {
                    missing.push(field);
                    default_for(field)
                }
            };
            let value = if IDENTIFIER_FIELDS.contains(&field) {
                identifier_text(&value).map(Value::String).unwrap_or(Value::Null)
            } else {
                value
            };
            fields.insert(field.to_string(), value);
        }

        (NormalizedRecord { fields }, missing)
    }

    /// Normalize every row of an extract, accumulating the missing-value histogram
    pub fn normalize_batch(&self, records: &[RawRecord]) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            records: Vec::with_capacity(records.len()),
            missing_values: MissingValues::new(),
        };

        for record in records {
            let (normalized, missing) = self.normalize_tracking_missing(record);
            for field in missing {
                *batch.missing_values.entry(field.to_string()).or_insert(0) += 1;
            }
            batch.records.push(normalized);
        }

        if !batch.missing_values.is_empty() {
            warn!(
                "Missing values found in {} columns",
                batch.missing_values.len()
            );
            for (field, count) in &batch.missing_values {
                warn!("  {}: {} missing values", field, count);
            }
        }

        batch
    }
}

impl Normalizer for VehicleNormalizer {
    fn normalize(&self, record: &RawRecord) -> NormalizedRecord {
        self.normalize_tracking_missing(record).0
    }
}

/// Whether a cell counts as "no value": null or a missing sentinel string
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => is_missing_text(s),
        _ => false,
    }
}

pub(crate) fn is_missing_text(text: &str) -> bool {
    MISSING_SENTINELS.contains(&text.trim())
}

fn default_for(field: &str) -> Value {
    if TEXT_DEFAULT_FIELDS.contains(&field) {
        Value::String(String::new())
    } else if NUMERIC_DEFAULT_FIELDS.contains(&field) {
        Value::Number(Number::from(0))
    } else {
        Value::Null
    }
}

/// Render an opaque identifier as text; `None` for missing forms
fn identifier_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if is_missing_text(s) => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Integral numbers render without a fractional part
pub(crate) fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HEADER_MAPPING;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn sample_row() -> RawRecord {
        raw(json!({
            "VIN (1-10)": "5YJSA1E26K",
            "County": "King",
            "City": "Seattle",
            "State": "WA",
            "Postal Code": "98101",
            "Model Year": "2023",
            "Make": "TESLA",
            "Model": "MODEL S",
            "Electric Vehicle Type": "Battery Electric Vehicle (BEV)",
            "Clean Alternative Fuel Vehicle (CAFV) Eligibility": "Eligible",
            "Electric Range": "405",
            "Base MSRP": "0",
            "Legislative District": "43",
            "DOL Vehicle ID": "12345",
            "Vehicle Location": "POINT (-122.3 47.6)",
            "Electric Utility": "CITY OF SEATTLE",
            "2020 Census Tract": "53033007300"
        }))
    }

    #[test]
    fn test_normalize_renames_to_canonical_fields() {
        let record = VehicleNormalizer::new().normalize(&sample_row());

        assert_eq!(record.len(), HEADER_MAPPING.len());
        for field in canonical_fields() {
            assert!(record.get(field).is_some(), "missing {field}");
        }
        assert_eq!(record.get("vin_1_10"), Some(&json!("5YJSA1E26K")));
        assert!(record.get("VIN (1-10)").is_none());
    }

    #[test]
    fn test_missing_columns_get_defaults() {
        let row = raw(json!({"VIN (1-10)": "5YJSA1E26K", "County": "King"}));
        let (record, missing) = VehicleNormalizer::new().normalize_tracking_missing(&row);

        assert_eq!(record.len(), HEADER_MAPPING.len());
        assert_eq!(record.get("electric_range"), Some(&json!(0)));
        assert_eq!(record.get("base_msrp"), Some(&json!(0)));
        assert_eq!(record.get("vehicle_location"), Some(&json!("")));
        assert_eq!(record.get("make"), Some(&Value::Null));
        // identifier defaults collapse to null
        assert_eq!(record.get("postal_code"), Some(&Value::Null));
        assert!(missing.contains(&"make"));
        assert!(!missing.contains(&"county"));
    }

    #[test]
    fn test_identifiers_become_text() {
        let mut row = sample_row();
        row.insert("Postal Code".into(), json!(98101));
        row.insert("DOL Vehicle ID".into(), json!(123456789.0));
        row.insert("2020 Census Tract".into(), json!("NA"));

        let record = VehicleNormalizer::new().normalize(&row);
        assert_eq!(record.get("postal_code"), Some(&json!("98101")));
        assert_eq!(record.get("dol_vehicle_id"), Some(&json!("123456789")));
        assert_eq!(record.get("census_tract_2020"), Some(&Value::Null));
    }

    #[test]
    fn test_missing_histogram_counts_per_column() {
        let mut first = sample_row();
        first.insert("Postal Code".into(), Value::Null);
        let mut second = sample_row();
        second.insert("Electric Range".into(), json!(""));
        second.insert("Postal Code".into(), json!("N/A"));

        let batch = VehicleNormalizer::new().normalize_batch(&[first, second, sample_row()]);

        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.missing_values.get("postal_code"), Some(&2));
        assert_eq!(batch.missing_values.get("electric_range"), Some(&1));
        assert!(batch.missing_values.get("make").is_none());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = VehicleNormalizer::new();
        let mut row = sample_row();
        row.insert("Postal Code".into(), Value::Null);
        row.insert("Base MSRP".into(), json!("NA"));
        row.insert("Unmapped".into(), json!("dropped"));

        let once = normalizer.normalize(&row);
        let twice = normalizer.normalize(&once.clone().into_raw());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_is_missing_sentinels() {
        assert!(is_missing(&Value::Null));
        assert!(is_missing(&json!("")));
        assert!(is_missing(&json!("  NA ")));
        assert!(is_missing(&json!("N/A")));
        assert!(!is_missing(&json!("0")));
        assert!(!is_missing(&json!(0)));
    }
}
