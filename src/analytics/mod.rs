//! Read-only aggregation engine over the stored vehicle documents.
//!
//! Each operation asks the [`VehicleStore`] for grouped tallies, so the
//! grouping runs inside the store, and folds them with a pure function
//! from its submodule. Averages and
//! percentages are rounded half away from zero to two decimals.

pub mod analyze;
pub mod county;
pub mod make_models;
pub mod summary;
pub mod trends;

pub use analyze::{AnalyzeFilters, AnalyzeRequest, AnalyzeResponse, GroupBy, GroupStatistics, YearRange};
pub use county::{CountyQuery, CountyVehiclesResponse};
pub use make_models::{MakeModelsResponse, ModelStatistics};
pub use summary::SummaryResponse;
pub use trends::{TrendsResponse, YearTrend};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::domain::canonicalize;
use crate::error::{AnalyticsError, Result};
use crate::metrics::QueryMetrics;
use crate::pipeline::storage::{TallyField, VehicleFilter, VehicleStore};

/// Query engine handle; cheap to clone and safe to share across requests
#[derive(Clone)]
pub struct VehicleAnalytics {
    store: Arc<dyn VehicleStore>,
}

impl VehicleAnalytics {
    pub fn new(store: Arc<dyn VehicleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn VehicleStore> {
        &self.store
    }

    pub async fn summary(&self) -> Result<SummaryResponse> {
        timed("summary", async {
            let all = VehicleFilter::all();
            let by_type = self.store.tally(&all, &[TallyField::ElectricVehicleType]).await?;
            let by_make = self.store.tally(&all, &[TallyField::Make]).await?;
            let by_eligibility = self.store.tally(&all, &[TallyField::CafvEligibility]).await?;
            Ok(summary::summarize(&by_type, &by_make, &by_eligibility))
        })
        .await
    }

    pub async fn county_vehicles(&self, query: &CountyQuery) -> Result<CountyVehiclesResponse> {
        timed("county_vehicles", async {
            query.check_bounds()?;
            let county = canonicalize(&query.county);
            let mut filter = VehicleFilter::county(county.clone());
            if let Some(year) = query.model_year {
                filter = filter.with_model_year(year);
            }

            let total = self.store.count(&filter).await?;
            if total == 0 {
                return Err(AnalyticsError::NotFound(format!(
                    "No vehicles found for county: {}",
                    query.county
                )));
            }

            let docs = self.store.find(&filter, &query.find_options()).await?;
            Ok(county::page_response(
                county,
                total,
                query,
                docs.into_iter().map(|d| d.vehicle).collect(),
            ))
        })
        .await
    }

    pub async fn make_models(&self, make: &str) -> Result<MakeModelsResponse> {
        timed("make_models", async {
            let make = canonicalize(make);
            let by_model = self
                .store
                .tally(&VehicleFilter::make(make.clone()), &[TallyField::Model])
                .await?;
            make_models::model_statistics(&make, &by_model).ok_or_else(|| {
                AnalyticsError::NotFound(format!("No vehicles found for make: {make}"))
            })
        })
        .await
    }

    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse> {
        timed("analyze", async {
            let filter = request.filters.to_filter()?;
            let tallies = self
                .store
                .tally(&filter, &request.group_by.tally_fields())
                .await?;
            debug!("Analyzing {} tally groups", tallies.len());
            analyze::group_statistics(request.group_by, &tallies).ok_or_else(|| {
                AnalyticsError::NotFound("No vehicles match the specified filters".to_string())
            })
        })
        .await
    }

    pub async fn trends(&self) -> Result<TrendsResponse> {
        timed("trends", async {
            let tallies = self
                .store
                .tally(&VehicleFilter::all(), &trends::TREND_FIELDS)
                .await?;
            trends::year_trends(&tallies)?
                .ok_or_else(|| AnalyticsError::NotFound("No trend data available".to_string()))
        })
        .await
    }
}

async fn timed<T, F>(operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) if e.is_not_found() => "not_found",
        Err(AnalyticsError::InvalidQuery(_)) => "invalid",
        Err(e) => {
            error!("Error in {}: {}", operation, e);
            "error"
        }
    };
    QueryMetrics::record_query(operation, start.elapsed().as_secs_f64(), outcome);
    result
}

/// Round half away from zero to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean of `sum / count`, 0.0 for an empty set
pub(crate) fn mean(sum: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

/// Sort `(key, count)` pairs by count desc, then key asc
pub(crate) fn rank_counts<K: Ord>(counts: impl IntoIterator<Item = (K, usize)>) -> Vec<(K, usize)> {
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{in_county, phev, vehicle};
    use crate::domain::ValidatedVehicle;
    use crate::pipeline::storage::{InMemoryStore, SortField, SortOrder};

    async fn engine(vehicles: Vec<ValidatedVehicle>) -> VehicleAnalytics {
        let store = Arc::new(InMemoryStore::new());
        store.insert_many(&vehicles).await.unwrap();
        VehicleAnalytics::new(store)
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(2.125), 2.13);
        assert_eq!(round2(-2.125), -2.13);
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(10.0), 10.0);
    }

    #[test]
    fn test_rank_counts_breaks_ties_by_key() {
        let ranked = rank_counts(vec![("B", 2), ("A", 2), ("C", 5)]);
        assert_eq!(ranked, vec![("C", 5), ("A", 2), ("B", 2)]);
    }

    #[tokio::test]
    async fn test_make_models_tesla_example() {
        let analytics = engine(vec![
            vehicle("TESLA", "MODEL S", 2023, 405),
            vehicle("TESLA", "MODEL 3", 2024, 358),
        ])
        .await;

        let response = analytics.make_models("tesla").await.unwrap();
        assert_eq!(response.make, "TESLA");
        assert_eq!(response.total_models, 2);
        for model in &response.models {
            assert_eq!(model.count, 1);
        }
        let s = response.models.iter().find(|m| m.model == "MODEL S").unwrap();
        assert_eq!(s.average_electric_range, 405.0);
        let three = response.models.iter().find(|m| m.model == "MODEL 3").unwrap();
        assert_eq!(three.average_electric_range, 358.0);
    }

    #[tokio::test]
    async fn test_unknown_make_and_county_are_not_found() {
        let analytics = engine(vec![vehicle("TESLA", "MODEL S", 2023, 405)]).await;

        assert!(analytics.make_models("DELOREAN").await.unwrap_err().is_not_found());
        let err = analytics
            .county_vehicles(&CountyQuery::new("NONEXISTENT_COUNTY"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_county_case_insensitive_and_paged() {
        let fleet: Vec<_> = (0..45)
            .map(|i| vehicle("KIA", "NIRO", 2015 + (i % 10), 200))
            .chain([in_county(vehicle("FORD", "F-150", 2023, 300), "PIERCE")])
            .collect();
        let analytics = engine(fleet).await;

        let lower = analytics.county_vehicles(&CountyQuery::new("king")).await.unwrap();
        let upper = analytics.county_vehicles(&CountyQuery::new("KING")).await.unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.county, "KING");
        assert_eq!(lower.total_count, 45);
        assert_eq!(lower.total_pages, 3);
        assert_eq!(lower.vehicles.len(), 20);
        assert_eq!(lower.vehicles[0].model_year, 2024);

        let last = CountyQuery {
            page: 3,
            ..CountyQuery::new("King")
        };
        assert_eq!(analytics.county_vehicles(&last).await.unwrap().vehicles.len(), 5);

        let beyond = CountyQuery {
            page: 9,
            ..CountyQuery::new("King")
        };
        assert!(analytics.county_vehicles(&beyond).await.unwrap().vehicles.is_empty());

        let year = CountyQuery {
            model_year: Some(2016),
            sort_by: SortField::Make,
            sort_order: SortOrder::Asc,
            ..CountyQuery::new("King")
        };
        let by_year = analytics.county_vehicles(&year).await.unwrap();
        assert_eq!(by_year.total_count, 5);
        assert_eq!(by_year.total_pages, 1);
    }

    #[tokio::test]
    async fn test_county_bounds_rejected() {
        let analytics = engine(vec![vehicle("KIA", "NIRO", 2020, 200)]).await;
        for (page, page_size) in [(0, 20), (1, 0), (1, 101)] {
            let query = CountyQuery {
                page,
                page_size,
                ..CountyQuery::new("KING")
            };
            let err = analytics.county_vehicles(&query).await.unwrap_err();
            assert!(matches!(err, AnalyticsError::InvalidQuery(_)));
        }
    }

    #[tokio::test]
    async fn test_summary_and_trends_over_store() {
        let analytics = engine(vec![
            vehicle("TESLA", "MODEL 3", 2020, 250),
            phev("TOYOTA", "PRIUS PRIME", 2020, 25),
            vehicle("TESLA", "MODEL Y", 2022, 0),
        ])
        .await;

        let summary = analytics.summary().await.unwrap();
        assert_eq!(summary.total_vehicles, 3);
        assert_eq!(summary.average_electric_range, 137.5);

        let trends = analytics.trends().await.unwrap();
        assert_eq!(trends.trends.len(), 2);
        assert_eq!(trends.trends[0].model_year, 2020);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let analytics = engine(vec![]).await;
        let summary = analytics.summary().await.unwrap();
        assert_eq!(summary.total_vehicles, 0);
        assert_eq!(summary.average_electric_range, 0.0);
        assert!(analytics.trends().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_not_found() {
        let store = Arc::new(InMemoryStore::new());
        store.set_available(false);
        let analytics = VehicleAnalytics::new(store);
        let err = analytics.summary().await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, AnalyticsError::StoreConnection(_)));
    }
}
