use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{mean, round2};
use crate::domain::canonicalize;
use crate::error::{AnalyticsError, Result};
use crate::pipeline::storage::{GroupTally, TallyField, VehicleFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    County,
    Make,
    ModelYear,
    VehicleType,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::County => "county",
            GroupBy::Make => "make",
            GroupBy::ModelYear => "model_year",
            GroupBy::VehicleType => "vehicle_type",
        }
    }

    /// Stored field behind the grouping
    pub fn field(&self) -> TallyField {
        match self {
            GroupBy::County => TallyField::County,
            GroupBy::Make => TallyField::Make,
            GroupBy::ModelYear => TallyField::ModelYear,
            GroupBy::VehicleType => TallyField::ElectricVehicleType,
        }
    }

    /// Tally fields `group_statistics` expects: the group, then make and model
    pub fn tally_fields(&self) -> [TallyField; 3] {
        [self.field(), TallyField::Make, TallyField::Model]
    }
}

/// Inclusive model year bounds; either side may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeFilters {
    pub makes: Option<Vec<String>>,
    pub model_years: Option<YearRange>,
    pub min_electric_range: Option<u32>,
    pub counties: Option<Vec<String>>,
    pub vehicle_types: Option<Vec<String>>,
}

impl AnalyzeFilters {
    /// Canonicalized store filter
    pub fn to_filter(&self) -> Result<VehicleFilter> {
        let canonical = |set: &Option<Vec<String>>| {
            set.as_ref()
                .map(|values| values.iter().map(|v| canonicalize(v)).collect::<Vec<_>>())
        };
        let years = self.model_years.unwrap_or_default();
        if let (Some(start), Some(end)) = (years.start, years.end) {
            if start > end {
                return Err(AnalyticsError::InvalidQuery(format!(
                    "model_years start {start} is after end {end}"
                )));
            }
        }

        Ok(VehicleFilter {
            makes: canonical(&self.makes),
            counties: canonical(&self.counties),
            vehicle_types: canonical(&self.vehicle_types),
            model_year_min: years.start,
            model_year_max: years.end,
            min_electric_range: self.min_electric_range,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub filters: AnalyzeFilters,
    pub group_by: GroupBy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatistics {
    pub group_value: String,
    pub count: usize,
    pub average_electric_range: f64,
    /// "MAKE MODEL"
    pub most_common_vehicle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub group_by: String,
    pub total_matching_vehicles: usize,
    pub groups: Vec<GroupStatistics>,
}

#[derive(Default)]
struct Group<'a> {
    count: usize,
    range_sum: u64,
    most_common: Option<((&'a str, &'a str), usize)>,
}

impl<'a> Group<'a> {
    /// Highest count wins; ties go to the smallest (make, model) pair
    fn offer(&mut self, pair: (&'a str, &'a str), count: usize) {
        let better = self.most_common.map_or(true, |(best, best_count)| {
            count > best_count || (count == best_count && pair < best)
        });
        if better {
            self.most_common = Some((pair, count));
        }
    }

    fn most_common(&self) -> String {
        self.most_common
            .map(|((make, model), _)| format!("{make} {model}"))
            .unwrap_or_default()
    }
}

/// Fold (group, make, model) tallies into per-group statistics; `None` when nothing matched
pub fn group_statistics(group_by: GroupBy, tallies: &[GroupTally]) -> Option<AnalyzeResponse> {
    if tallies.is_empty() {
        return None;
    }

    let mut groups: BTreeMap<&str, Group<'_>> = BTreeMap::new();
    for t in tallies {
        let group = groups.entry(t.part(0)).or_default();
        group.count += t.count;
        group.range_sum += t.range_sum;
        group.offer((t.part(1), t.part(2)), t.count);
    }
    let total_matching_vehicles = groups.values().map(|g| g.count).sum();

    let mut stats: Vec<GroupStatistics> = groups
        .into_iter()
        .map(|(value, group)| GroupStatistics {
            most_common_vehicle: group.most_common(),
            average_electric_range: round2(mean(group.range_sum, group.count)),
            count: group.count,
            group_value: value.to_string(),
        })
        .collect();
    stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.group_value.cmp(&b.group_value))
    });

    Some(AnalyzeResponse {
        group_by: group_by.as_str().to_string(),
        total_matching_vehicles,
        groups: stats,
    })
}
