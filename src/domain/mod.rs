use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_MODEL_YEAR, MIN_MODEL_YEAR};

/// A registration record that passed validation.
///
/// Grouped text fields (`county`, `city`, `make`, `model`,
/// `electric_vehicle_type`) are trimmed and uppercased; every query compares
/// against that form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedVehicle {
    pub vin_1_10: String,
    pub county: String,
    pub city: String,
    pub state: String,
    pub postal_code: Option<String>,
    pub model_year: i32,
    pub make: String,
    pub model: String,
    pub electric_vehicle_type: String,
    pub cafv_eligibility: String,
    pub electric_range: u32,
    pub base_msrp: u32,
    pub legislative_district: Option<String>,
    pub dol_vehicle_id: String,
    pub vehicle_location: Option<String>,
    pub electric_utility: Option<String>,
    pub census_tract_2020: Option<String>,
}

impl ValidatedVehicle {
    /// Document-level invariants a store enforces on write.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !(MIN_MODEL_YEAR..=MAX_MODEL_YEAR).contains(&self.model_year) {
            return Err(format!(
                "model_year {} outside {}..={}",
                self.model_year, MIN_MODEL_YEAR, MAX_MODEL_YEAR
            ));
        }
        for (field, value) in [
            ("vin_1_10", &self.vin_1_10),
            ("county", &self.county),
            ("city", &self.city),
            ("make", &self.make),
            ("model", &self.model),
            ("electric_vehicle_type", &self.electric_vehicle_type),
            ("dol_vehicle_id", &self.dol_vehicle_id),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
        }
        for (field, value) in [
            ("county", &self.county),
            ("city", &self.city),
            ("make", &self.make),
            ("model", &self.model),
            ("electric_vehicle_type", &self.electric_vehicle_type),
        ] {
            if *value != canonicalize(value) {
                return Err(format!("{field} is not in canonical form: '{value}'"));
            }
        }
        Ok(())
    }
}

/// A persisted vehicle with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDocument {
    pub id: Uuid,
    #[serde(flatten)]
    pub vehicle: ValidatedVehicle,
}

impl VehicleDocument {
    pub fn new(vehicle: ValidatedVehicle) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle,
        }
    }
}

/// Canonical form of a grouped text value: trimmed and uppercased.
pub fn canonicalize(value: &str) -> String {
    value.trim().to_uppercase()
}
