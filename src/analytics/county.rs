use serde::{Deserialize, Serialize};

use crate::domain::ValidatedVehicle;
use crate::error::{AnalyticsError, Result};
use crate::pipeline::storage::{FindOptions, SortField, SortOrder, SortSpec};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Paginated listing of one county's vehicles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountyQuery {
    pub county: String,
    pub model_year: Option<i32>,
    /// 1-indexed
    pub page: i64,
    pub page_size: i64,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl CountyQuery {
    pub fn new(county: impl Into<String>) -> Self {
        Self {
            county: county.into(),
            model_year: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortField::ModelYear,
            sort_order: SortOrder::Desc,
        }
    }

    pub fn check_bounds(&self) -> Result<()> {
        if self.page < 1 {
            return Err(AnalyticsError::InvalidQuery(format!(
                "page must be >= 1 (got {})",
                self.page
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(AnalyticsError::InvalidQuery(format!(
                "page_size must be between 1 and {} (got {})",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        Ok(())
    }

    /// Assumes `check_bounds` passed
    pub fn find_options(&self) -> FindOptions {
        let page_size = self.page_size as usize;
        FindOptions {
            sort: Some(SortSpec {
                field: self.sort_by,
                order: self.sort_order,
            }),
            skip: (self.page as usize - 1).saturating_mul(page_size),
            limit: Some(page_size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyVehiclesResponse {
    pub county: String,
    pub total_count: u64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: u64,
    pub vehicles: Vec<ValidatedVehicle>,
}

pub fn total_pages(total: u64, page_size: i64) -> u64 {
    total.div_ceil(page_size.max(1) as u64)
}

pub fn page_response(
    county: String,
    total: u64,
    query: &CountyQuery,
    vehicles: Vec<ValidatedVehicle>,
) -> CountyVehiclesResponse {
    CountyVehiclesResponse {
        county,
        total_count: total,
        page: query.page,
        page_size: query.page_size,
        total_pages: total_pages(total, query.page_size),
        vehicles,
    }
}
