/// Canonical field names and the fixed source-header contract.
/// Everything downstream of the normalizer speaks these names only.

// Canonical field names
pub const VIN_1_10: &str = "vin_1_10";
pub const COUNTY: &str = "county";
pub const CITY: &str = "city";
pub const STATE: &str = "state";
pub const POSTAL_CODE: &str = "postal_code";
pub const MODEL_YEAR: &str = "model_year";
pub const MAKE: &str = "make";
pub const MODEL: &str = "model";
pub const ELECTRIC_VEHICLE_TYPE: &str = "electric_vehicle_type";
pub const CAFV_ELIGIBILITY: &str = "cafv_eligibility";
pub const ELECTRIC_RANGE: &str = "electric_range";
pub const BASE_MSRP: &str = "base_msrp";
pub const LEGISLATIVE_DISTRICT: &str = "legislative_district";
pub const DOL_VEHICLE_ID: &str = "dol_vehicle_id";
pub const VEHICLE_LOCATION: &str = "vehicle_location";
pub const ELECTRIC_UTILITY: &str = "electric_utility";
pub const CENSUS_TRACT_2020: &str = "census_tract_2020";

/// Source column header -> canonical field name
pub const HEADER_MAPPING: [(&str, &str); 17] = [
    ("VIN (1-10)", VIN_1_10),
    ("County", COUNTY),
    ("City", CITY),
    ("State", STATE),
    ("Postal Code", POSTAL_CODE),
    ("Model Year", MODEL_YEAR),
    ("Make", MAKE),
    ("Model", MODEL),
    ("Electric Vehicle Type", ELECTRIC_VEHICLE_TYPE),
    (
        "Clean Alternative Fuel Vehicle (CAFV) Eligibility",
        CAFV_ELIGIBILITY,
    ),
    ("Electric Range", ELECTRIC_RANGE),
    ("Base MSRP", BASE_MSRP),
    ("Legislative District", LEGISLATIVE_DISTRICT),
    ("DOL Vehicle ID", DOL_VEHICLE_ID),
    ("Vehicle Location", VEHICLE_LOCATION),
    ("Electric Utility", ELECTRIC_UTILITY),
    ("2020 Census Tract", CENSUS_TRACT_2020),
];

/// Fields defaulted to an empty string when missing
pub const TEXT_DEFAULT_FIELDS: [&str; 5] = [
    POSTAL_CODE,
    LEGISLATIVE_DISTRICT,
    VEHICLE_LOCATION,
    ELECTRIC_UTILITY,
    CENSUS_TRACT_2020,
];

/// Fields defaulted to zero when missing
pub const NUMERIC_DEFAULT_FIELDS: [&str; 2] = [ELECTRIC_RANGE, BASE_MSRP];

/// Numeric-looking fields that are really opaque identifiers
pub const IDENTIFIER_FIELDS: [&str; 4] = [
    POSTAL_CODE,
    LEGISLATIVE_DISTRICT,
    DOL_VEHICLE_ID,
    CENSUS_TRACT_2020,
];

/// Fields a record cannot be accepted without
pub const REQUIRED_TEXT_FIELDS: [&str; 8] = [
    VIN_1_10,
    COUNTY,
    CITY,
    MAKE,
    MODEL,
    ELECTRIC_VEHICLE_TYPE,
    CAFV_ELIGIBILITY,
    DOL_VEHICLE_ID,
];

/// Cell contents treated as "no value" in the source extract
pub const MISSING_SENTINELS: [&str; 9] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "#N/A"];

/// Sentinels the numeric coercion maps straight to zero
pub const NUMERIC_SENTINELS: [&str; 3] = ["", "NA", "N/A"];

pub const MIN_MODEL_YEAR: i32 = 1997;
pub const MAX_MODEL_YEAR: i32 = 2026;

pub const DEFAULT_STATE: &str = "WA";
pub const UNKNOWN_VIN: &str = "UNKNOWN";

// Vehicle type labels
pub const BEV_LABEL: &str = "BATTERY ELECTRIC VEHICLE (BEV)";
pub const PHEV_LABEL: &str = "PLUG-IN HYBRID ELECTRIC VEHICLE (PHEV)";
pub const BEV_CODE: &str = "BEV";
pub const PHEV_CODE: &str = "PHEV";

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const MAX_REPORTED_ERRORS: usize = 100;
pub const PROGRESS_LOG_INTERVAL: usize = 50_000;

/// Resolve a source header (or an already-canonical name) to its canonical field
pub fn canonical_field(header: &str) -> Option<&'static str> {
    let header = header.trim();
    HEADER_MAPPING
        .iter()
        .find(|(source, canonical)| *source == header || *canonical == header)
        .map(|(_, canonical)| *canonical)
}

/// All canonical field names in contract order
pub fn canonical_fields() -> impl Iterator<Item = &'static str> {
    HEADER_MAPPING.iter().map(|(_, canonical)| *canonical)
}
