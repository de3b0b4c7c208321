use serde::{Deserialize, Serialize};

use super::{mean, rank_counts, round2};
use crate::pipeline::storage::GroupTally;

const TOP_MAKES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTypeSummary {
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeSummary {
    pub make: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilitySummary {
    pub eligibility: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub total_vehicles: usize,
    pub vehicles_by_type: Vec<VehicleTypeSummary>,
    pub top_10_makes: Vec<MakeSummary>,
    /// Mean over vehicles with a known (non-zero) range
    pub average_electric_range: f64,
    pub eligibility_summary: Vec<EligibilitySummary>,
}

/// Build the summary from per-type, per-make and per-eligibility tallies
pub fn summarize(
    by_type: &[GroupTally],
    by_make: &[GroupTally],
    by_eligibility: &[GroupTally],
) -> SummaryResponse {
    let total_vehicles = by_type.iter().map(|t| t.count).sum();
    let ranged = by_type.iter().map(|t| t.ranged).sum();
    let ranged_sum = by_type.iter().map(|t| t.ranged_sum).sum();

    SummaryResponse {
        total_vehicles,
        vehicles_by_type: ranked(by_type)
            .map(|(t, count)| VehicleTypeSummary {
                vehicle_type: t.to_string(),
                count,
            })
            .collect(),
        top_10_makes: ranked(by_make)
            .take(TOP_MAKES)
            .map(|(make, count)| MakeSummary {
                make: make.to_string(),
                count,
            })
            .collect(),
        average_electric_range: round2(mean(ranged_sum, ranged)),
        eligibility_summary: ranked(by_eligibility)
            .map(|(e, count)| EligibilitySummary {
                eligibility: e.to_string(),
                count,
            })
            .collect(),
    }
}

fn ranked(tallies: &[GroupTally]) -> impl Iterator<Item = (&str, usize)> {
    rank_counts(tallies.iter().map(|t| (t.part(0), t.count))).into_iter()
}
