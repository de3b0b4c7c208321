// Document store abstraction and its backends

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::domain::{ValidatedVehicle, VehicleDocument};
use crate::error::{AnalyticsError, Result};

/// Storage trait for persisting and querying vehicle documents
#[async_trait]
pub trait VehicleStore: Send + Sync {
    /// Connection check; fails with `StoreConnection` when unreachable
    async fn ping(&self) -> Result<()>;

    /// Remove every document and index (used before a full reload)
    async fn drop_all(&self) -> Result<()>;

    /// Unordered insert; a bad document is reported, not fatal
    async fn insert_many(&self, vehicles: &[ValidatedVehicle]) -> Result<InsertManyOutcome>;

    async fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<()>;
    async fn list_indexes(&self) -> Result<Vec<String>>;

    async fn count(&self, filter: &VehicleFilter) -> Result<u64>;
    async fn find(&self, filter: &VehicleFilter, options: &FindOptions) -> Result<Vec<VehicleDocument>>;

    /// Grouped counts and range sums over the matching documents
    async fn tally(&self, filter: &VehicleFilter, fields: &[TallyField]) -> Result<Vec<GroupTally>>;
}

/// Result of one `insert_many` call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InsertManyOutcome {
    pub inserted: usize,
    pub write_errors: Vec<DocumentWriteError>,
}

/// A single document the store refused
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentWriteError {
    /// Position inside the submitted batch
    pub index: usize,
    pub message: String,
}

/// Conjunctive filter over vehicle documents.
///
/// Set-valued members match when the field equals any element. All text
/// values must already be canonical.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleFilter {
    pub makes: Option<Vec<String>>,
    pub counties: Option<Vec<String>>,
    pub vehicle_types: Option<Vec<String>>,
    pub model_year_min: Option<i32>,
    pub model_year_max: Option<i32>,
    pub min_electric_range: Option<u32>,
}

impl VehicleFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn county(county: impl Into<String>) -> Self {
        Self {
            counties: Some(vec![county.into()]),
            ..Self::default()
        }
    }

    pub fn make(make: impl Into<String>) -> Self {
        Self {
            makes: Some(vec![make.into()]),
            ..Self::default()
        }
    }

    pub fn with_model_year(mut self, year: i32) -> Self {
        self.model_year_min = Some(year);
        self.model_year_max = Some(year);
        self
    }

    pub fn matches(&self, vehicle: &ValidatedVehicle) -> bool {
        fn in_set(set: &Option<Vec<String>>, value: &str) -> bool {
            set.as_ref().map_or(true, |s| s.iter().any(|v| v == value))
        }

        in_set(&self.makes, &vehicle.make)
            && in_set(&self.counties, &vehicle.county)
            && in_set(&self.vehicle_types, &vehicle.electric_vehicle_type)
            && self.model_year_min.map_or(true, |y| vehicle.model_year >= y)
            && self.model_year_max.map_or(true, |y| vehicle.model_year <= y)
            && self
                .min_electric_range
                .map_or(true, |r| vehicle.electric_range >= r)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    ModelYear,
    Make,
    Model,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::ModelYear => "model_year",
            SortField::Make => "make",
            SortField::Model => "model",
        }
    }
}

impl FromStr for SortField {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "model_year" => Ok(SortField::ModelYear),
            "make" => Ok(SortField::Make),
            "model" => Ok(SortField::Model),
            other => Err(AnalyticsError::InvalidQuery(format!(
                "sort_by must be one of model_year, make, model (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(AnalyticsError::InvalidQuery(format!(
                "sort_order must be asc or desc (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

/// Sort, skip and limit for `find`; ties keep insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Field a store can group on in `tally`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyField {
    County,
    ModelYear,
    Make,
    Model,
    ElectricVehicleType,
    CafvEligibility,
}

impl TallyField {
    pub fn column(&self) -> &'static str {
        match self {
            TallyField::County => "county",
            TallyField::ModelYear => "model_year",
            TallyField::Make => "make",
            TallyField::Model => "model",
            TallyField::ElectricVehicleType => "electric_vehicle_type",
            TallyField::CafvEligibility => "cafv_eligibility",
        }
    }

    /// Group key as text; model years render as decimal
    pub fn value(&self, vehicle: &ValidatedVehicle) -> String {
        match self {
            TallyField::County => vehicle.county.clone(),
            TallyField::ModelYear => vehicle.model_year.to_string(),
            TallyField::Make => vehicle.make.clone(),
            TallyField::Model => vehicle.model.clone(),
            TallyField::ElectricVehicleType => vehicle.electric_vehicle_type.clone(),
            TallyField::CafvEligibility => vehicle.cafv_eligibility.clone(),
        }
    }
}

/// One group from `tally`: `key` holds one value per grouped field, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTally {
    pub key: Vec<String>,
    pub count: usize,
    pub range_sum: u64,
    /// Documents with a known (non-zero) electric range
    pub ranged: usize,
    pub ranged_sum: u64,
}

impl GroupTally {
    /// Key component `i`, empty when out of bounds
    pub fn part(&self, i: usize) -> &str {
        self.key.get(i).map_or("", String::as_str)
    }
}

/// Group vehicles by `fields`, ordered by key. Stores without native
/// grouping build their `tally` on this.
pub fn tally_vehicles<'a>(
    vehicles: impl IntoIterator<Item = &'a ValidatedVehicle>,
    fields: &[TallyField],
) -> Vec<GroupTally> {
    let mut groups: BTreeMap<Vec<String>, GroupTally> = BTreeMap::new();
    for v in vehicles {
        let key: Vec<String> = fields.iter().map(|f| f.value(v)).collect();
        let group = groups.entry(key.clone()).or_insert_with(|| GroupTally {
            key,
            count: 0,
            range_sum: 0,
            ranged: 0,
            ranged_sum: 0,
        });
        group.count += 1;
        group.range_sum += u64::from(v.electric_range);
        if v.electric_range > 0 {
            group.ranged += 1;
            group.ranged_sum += u64::from(v.electric_range);
        }
    }
    groups.into_values().collect()
}

/// Indexable document fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    County,
    Make,
    Model,
    ModelYear,
    ElectricVehicleType,
    ElectricRange,
}

impl IndexField {
    pub fn column(&self) -> &'static str {
        match self {
            IndexField::County => "county",
            IndexField::Make => "make",
            IndexField::Model => "model",
            IndexField::ModelYear => "model_year",
            IndexField::ElectricVehicleType => "electric_vehicle_type",
            IndexField::ElectricRange => "electric_range",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexKey {
    pub field: IndexField,
    pub descending: bool,
}

const fn asc(field: IndexField) -> IndexKey {
    IndexKey {
        field,
        descending: false,
    }
}

const fn desc(field: IndexField) -> IndexKey {
    IndexKey {
        field,
        descending: true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub keys: &'static [IndexKey],
}

/// Index set backing the query engine's filters and groupings
pub const VEHICLE_INDEXES: [IndexSpec; 8] = [
    IndexSpec {
        name: "idx_county",
        keys: &[asc(IndexField::County)],
    },
    IndexSpec {
        name: "idx_make",
        keys: &[asc(IndexField::Make)],
    },
    IndexSpec {
        name: "idx_model_year",
        keys: &[desc(IndexField::ModelYear)],
    },
    IndexSpec {
        name: "idx_ev_type",
        keys: &[asc(IndexField::ElectricVehicleType)],
    },
    IndexSpec {
        name: "idx_electric_range",
        keys: &[desc(IndexField::ElectricRange)],
    },
    IndexSpec {
        name: "idx_make_model",
        keys: &[asc(IndexField::Make), asc(IndexField::Model)],
    },
    IndexSpec {
        name: "idx_county_year",
        keys: &[asc(IndexField::County), desc(IndexField::ModelYear)],
    },
    IndexSpec {
        name: "idx_year_type",
        keys: &[desc(IndexField::ModelYear), asc(IndexField::ElectricVehicleType)],
    },
];
