use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{mean, round2};
use crate::constants::{BEV_CODE, PHEV_CODE};
use crate::error::{AnalyticsError, Result};
use crate::pipeline::storage::{GroupTally, TallyField};

/// Tally fields `year_trends` expects
pub const TREND_FIELDS: [TallyField; 2] = [TallyField::ModelYear, TallyField::ElectricVehicleType];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearTrend {
    pub model_year: i32,
    pub vehicle_count: usize,
    pub average_electric_range: f64,
    pub bev_count: usize,
    pub phev_count: usize,
    pub bev_percentage: f64,
    pub phev_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendsResponse {
    pub trends: Vec<YearTrend>,
    /// Mean yearly growth in vehicle count, percent
    pub overall_growth_rate: Option<f64>,
    /// Mean yearly change in average range, percent
    pub range_improvement_rate: Option<f64>,
}

#[derive(Default)]
struct YearTotals {
    count: usize,
    range_sum: u64,
    bev: usize,
    phev: usize,
}

fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

/// Yearly rate of change between the first and last point, percent
fn yearly_rate(first: f64, last: f64, span: i32) -> Option<f64> {
    if span <= 0 || first <= 0.0 {
        return None;
    }
    Some(round2((last - first) / first / f64::from(span) * 100.0))
}

/// Per model year statistics in ascending year order from (model year, type)
/// tallies; `Ok(None)` without data
pub fn year_trends(tallies: &[GroupTally]) -> Result<Option<TrendsResponse>> {
    let mut years: BTreeMap<i32, YearTotals> = BTreeMap::new();
    for t in tallies {
        let year: i32 = t.part(0).parse().map_err(|_| {
            AnalyticsError::store(format!("non-numeric model year '{}'", t.part(0)))
        })?;
        let vehicle_type = t.part(1);
        let totals = years.entry(year).or_default();
        totals.count += t.count;
        totals.range_sum += t.range_sum;
        if vehicle_type.contains(BEV_CODE) {
            totals.bev += t.count;
        }
        if vehicle_type.contains(PHEV_CODE) {
            totals.phev += t.count;
        }
    }

    let trends: Vec<YearTrend> = years
        .into_iter()
        .map(|(model_year, t)| YearTrend {
            model_year,
            vehicle_count: t.count,
            average_electric_range: round2(mean(t.range_sum, t.count)),
            bev_count: t.bev,
            phev_count: t.phev,
            bev_percentage: share(t.bev, t.bev + t.phev),
            phev_percentage: share(t.phev, t.bev + t.phev),
        })
        .collect();

    let (Some(first), Some(last)) = (trends.first(), trends.last()) else {
        return Ok(None);
    };
    let (overall_growth_rate, range_improvement_rate) = if trends.len() >= 2 {
        let span = last.model_year - first.model_year;
        (
            yearly_rate(first.vehicle_count as f64, last.vehicle_count as f64, span),
            yearly_rate(first.average_electric_range, last.average_electric_range, span),
        )
    } else {
        (None, None)
    };

    Ok(Some(TrendsResponse {
        trends,
        overall_growth_rate,
        range_improvement_rate,
    }))
}
