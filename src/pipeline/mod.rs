// Ingestion pipeline: extraction, processing, loading and storage

pub mod ingestion;
pub mod load;
pub mod processing;
pub mod storage;

pub use ingestion::{extract, CsvSource, Extracted};
pub use load::{LoadSummary, Loader};
pub use processing::quality_report::QualityReport;
pub use processing::transform;
pub use storage::{InMemoryStore, SqliteStore, VehicleStore};

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::constants::DEFAULT_BATCH_SIZE;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub batch_size: usize,
    /// Empty the collection and its indexes before loading
    pub drop_existing: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            drop_existing: false,
        }
    }
}

/// What one run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub report: QualityReport,
    pub load: LoadSummary,
}

/// Extract, transform and load in a single pass
pub struct IngestionPipeline {
    store: Arc<dyn VehicleStore>,
    options: PipelineOptions,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn VehicleStore>, options: PipelineOptions) -> Self {
        Self { store, options }
    }

    #[instrument(skip_all, fields(source = %source, drop_existing = self.options.drop_existing))]
    pub async fn run(&self, source: &CsvSource) -> Result<RunOutcome> {
        info!("Starting EV data ingestion pipeline");
        let start = Instant::now();

        self.store.ping().await?;

        // A bad source must leave the stored data alone
        let extracted = extract(source).await?;

        if self.options.drop_existing {
            info!("Dropping existing collection");
            self.store.drop_all().await?;
        }

        let (vehicles, report) = transform(&extracted.rows);
        drop(extracted);

        let load = Loader::new(self.store.clone())
            .with_batch_size(self.options.batch_size)
            .load(&vehicles)
            .await?;

        info!(
            total = report.total_records,
            valid = report.valid_records,
            invalid = report.invalid_records,
            inserted = load.inserted,
            failed = load.failed,
            "Pipeline completed in {:.2}s",
            start.elapsed().as_secs_f64()
        );

        Ok(RunOutcome { report, load })
    }
}
