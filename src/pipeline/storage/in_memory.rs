use super::{
    tally_vehicles, DocumentWriteError, FindOptions, GroupTally, IndexSpec, InsertManyOutcome,
    SortField, SortOrder, TallyField, VehicleFilter, VehicleStore,
};
use crate::domain::{ValidatedVehicle, VehicleDocument};
use crate::error::{AnalyticsError, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// In-memory store for development/testing
pub struct InMemoryStore {
    documents: Arc<RwLock<Vec<VehicleDocument>>>,
    indexes: Arc<RwLock<Vec<String>>>,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(Vec::new())),
            indexes: Arc::new(RwLock::new(Vec::new())),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing the connection; every call fails with `StoreConnection`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(AnalyticsError::StoreConnection(
                "in-memory store is unavailable".to_string(),
            ))
        }
    }

    fn read_documents(&self) -> Result<RwLockReadGuard<'_, Vec<VehicleDocument>>> {
        self.documents
            .read()
            .map_err(|_| AnalyticsError::store("document lock poisoned"))
    }

    fn write_documents(&self) -> Result<RwLockWriteGuard<'_, Vec<VehicleDocument>>> {
        self.documents
            .write()
            .map_err(|_| AnalyticsError::store("document lock poisoned"))
    }

    fn write_indexes(&self) -> Result<RwLockWriteGuard<'_, Vec<String>>> {
        self.indexes
            .write()
            .map_err(|_| AnalyticsError::store("index lock poisoned"))
    }
}

fn compare(a: &ValidatedVehicle, b: &ValidatedVehicle, field: SortField) -> Ordering {
    match field {
        SortField::ModelYear => a.model_year.cmp(&b.model_year),
        SortField::Make => a.make.cmp(&b.make),
        SortField::Model => a.model.cmp(&b.model),
    }
}

#[async_trait]
impl VehicleStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn drop_all(&self) -> Result<()> {
        self.check_available()?;
        self.write_documents()?.clear();
        self.write_indexes()?.clear();
        debug!("Dropped in-memory collection");
        Ok(())
    }

    async fn insert_many(&self, vehicles: &[ValidatedVehicle]) -> Result<InsertManyOutcome> {
        self.check_available()?;
        let mut documents = self.write_documents()?;
        let mut outcome = InsertManyOutcome::default();

        for (index, vehicle) in vehicles.iter().enumerate() {
            match vehicle.check_invariants() {
                Ok(()) => {
                    documents.push(VehicleDocument::new(vehicle.clone()));
                    outcome.inserted += 1;
                }
                Err(message) => outcome.write_errors.push(DocumentWriteError { index, message }),
            }
        }

        debug!(
            "Inserted {} documents ({} rejected)",
            outcome.inserted,
            outcome.write_errors.len()
        );
        Ok(outcome)
    }

    async fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<()> {
        self.check_available()?;
        let mut names = self.write_indexes()?;
        for spec in indexes {
            if !names.iter().any(|n| n == spec.name) {
                names.push(spec.name.to_string());
            }
        }
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        self.check_available()?;
        let names = self
            .indexes
            .read()
            .map_err(|_| AnalyticsError::store("index lock poisoned"))?;
        Ok(names.clone())
    }

    async fn count(&self, filter: &VehicleFilter) -> Result<u64> {
        self.check_available()?;
        let documents = self.read_documents()?;
        Ok(documents.iter().filter(|d| filter.matches(&d.vehicle)).count() as u64)
    }

    async fn find(&self, filter: &VehicleFilter, options: &FindOptions) -> Result<Vec<VehicleDocument>> {
        self.check_available()?;
        let documents = self.read_documents()?;
        let mut matched: Vec<VehicleDocument> = documents
            .iter()
            .filter(|d| filter.matches(&d.vehicle))
            .cloned()
            .collect();
        drop(documents);

        // Stable sort so equal keys stay in insertion order
        if let Some(sort) = options.sort {
            matched.sort_by(|a, b| {
                let ord = compare(&a.vehicle, &b.vehicle, sort.field);
                match sort.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        let page = matched
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(page)
    }

    async fn tally(&self, filter: &VehicleFilter, fields: &[TallyField]) -> Result<Vec<GroupTally>> {
        self.check_available()?;
        let documents = self.read_documents()?;
        Ok(tally_vehicles(
            documents
                .iter()
                .map(|d| &d.vehicle)
                .filter(|v| filter.matches(v)),
            fields,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::vehicle;
    use crate::pipeline::storage::{SortSpec, VEHICLE_INDEXES};

    #[tokio::test]
    async fn test_insert_and_count() {
        let store = InMemoryStore::new();
        let outcome = store
            .insert_many(&[
                vehicle("TESLA", "MODEL 3", 2022, 272),
                vehicle("NISSAN", "LEAF", 2019, 150),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert!(outcome.write_errors.is_empty());
        assert_eq!(store.count(&VehicleFilter::all()).await.unwrap(), 2);
        assert_eq!(store.count(&VehicleFilter::make("TESLA")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_document_rejected_individually() {
        let store = InMemoryStore::new();
        let mut bad = vehicle("TESLA", "MODEL Y", 2023, 0);
        bad.make = "tesla".to_string();

        let outcome = store
            .insert_many(&[vehicle("KIA", "EV6", 2022, 310), bad])
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.write_errors.len(), 1);
        assert_eq!(outcome.write_errors[0].index, 1);
    }

    #[tokio::test]
    async fn test_find_sorts_stably_and_pages() {
        let store = InMemoryStore::new();
        store
            .insert_many(&[
                vehicle("A", "ONE", 2020, 0),
                vehicle("B", "TWO", 2022, 0),
                vehicle("C", "THREE", 2020, 0),
                vehicle("D", "FOUR", 2021, 0),
            ])
            .await
            .unwrap();

        let options = FindOptions {
            sort: Some(SortSpec {
                field: SortField::ModelYear,
                order: SortOrder::Desc,
            }),
            skip: 1,
            limit: Some(2),
        };
        let page = store.find(&VehicleFilter::all(), &options).await.unwrap();
        let makes: Vec<_> = page.iter().map(|d| d.vehicle.make.as_str()).collect();
        assert_eq!(makes, vec!["D", "A"]);

        let past_end = FindOptions {
            skip: 10,
            ..FindOptions::default()
        };
        assert!(store.find(&VehicleFilter::all(), &past_end).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tally_respects_filter() {
        let store = InMemoryStore::new();
        store
            .insert_many(&[
                vehicle("KIA", "EV6", 2022, 310),
                vehicle("KIA", "NIRO", 2021, 239),
                vehicle("TESLA", "MODEL 3", 2022, 272),
            ])
            .await
            .unwrap();

        let tallies = store
            .tally(&VehicleFilter::make("KIA"), &[TallyField::ModelYear])
            .await
            .unwrap();
        let keys: Vec<_> = tallies.iter().map(|t| (t.part(0), t.count)).collect();
        assert_eq!(keys, vec![("2021", 1), ("2022", 1)]);
    }

    #[tokio::test]
    async fn test_drop_all_and_indexes() {
        let store = InMemoryStore::new();
        store.insert_many(&[vehicle("KIA", "EV6", 2022, 310)]).await.unwrap();
        store.create_indexes(&VEHICLE_INDEXES).await.unwrap();
        store.create_indexes(&VEHICLE_INDEXES).await.unwrap();
        assert_eq!(store.list_indexes().await.unwrap().len(), VEHICLE_INDEXES.len());

        store.drop_all().await.unwrap();
        assert_eq!(store.count(&VehicleFilter::all()).await.unwrap(), 0);
        assert!(store.list_indexes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_with_connection_error() {
        let store = InMemoryStore::new();
        store.set_available(false);
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, AnalyticsError::StoreConnection(_)));
        assert!(store.count(&VehicleFilter::all()).await.is_err());
    }
}
