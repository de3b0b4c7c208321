use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::constants::DEFAULT_BATCH_SIZE;
use crate::domain::ValidatedVehicle;
use crate::error::Result;
use crate::metrics::LoadMetrics;
use crate::pipeline::storage::{VehicleStore, VEHICLE_INDEXES};

/// Per-document write errors logged at warn level before going quiet
const LOGGED_WRITE_ERRORS: usize = 5;

/// Totals of one load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub batches: usize,
    pub inserted: usize,
    pub failed: usize,
    pub indexes: Vec<String>,
}

/// Batched writer for validated vehicles
pub struct Loader {
    store: Arc<dyn VehicleStore>,
    batch_size: usize,
}

impl Loader {
    pub fn new(store: Arc<dyn VehicleStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Zero falls back to the default batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };
        self
    }

    #[instrument(skip_all, fields(records = vehicles.len(), batch_size = self.batch_size))]
    pub async fn load(&self, vehicles: &[ValidatedVehicle]) -> Result<LoadSummary> {
        info!("Loading {} records", vehicles.len());
        let mut summary = LoadSummary::default();

        for (batch_no, batch) in vehicles.chunks(self.batch_size).enumerate() {
            let start = Instant::now();
            let outcome = self.store.insert_many(batch).await?;
            let failed = outcome.write_errors.len();

            let already_logged = summary.failed.min(LOGGED_WRITE_ERRORS);
            for err in outcome
                .write_errors
                .iter()
                .take(LOGGED_WRITE_ERRORS - already_logged)
            {
                let offset = batch_no * self.batch_size + err.index;
                warn!(record = offset, "Document rejected by store: {}", err.message);
            }
            summary.failed += failed;
            summary.batches += 1;
            summary.inserted += outcome.inserted;

            LoadMetrics::record_batch(outcome.inserted, failed, start.elapsed().as_secs_f64());
            info!(
                "Batch {}: inserted {} documents ({} failed)",
                batch_no + 1,
                outcome.inserted,
                failed
            );
        }

        let start = Instant::now();
        self.store.create_indexes(&VEHICLE_INDEXES).await?;
        LoadMetrics::record_index_build(start.elapsed().as_secs_f64());
        summary.indexes = self.store.list_indexes().await?;

        info!(
            "Load complete: {} inserted, {} failed across {} batches",
            summary.inserted, summary.failed, summary.batches
        );
        Ok(summary)
    }
}
