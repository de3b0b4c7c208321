use super::{
    DocumentWriteError, FindOptions, GroupTally, IndexSpec, InsertManyOutcome, SortOrder,
    TallyField, VehicleFilter, VehicleStore,
};
use crate::domain::{ValidatedVehicle, VehicleDocument};
use crate::error::{AnalyticsError, Result};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS vehicles (
        id                     TEXT PRIMARY KEY,
        vin_1_10               TEXT NOT NULL CHECK (length(trim(vin_1_10)) > 0),
        county                 TEXT NOT NULL CHECK (length(county) > 0 AND county = upper(trim(county))),
        city                   TEXT NOT NULL CHECK (length(city) > 0 AND city = upper(trim(city))),
        state                  TEXT NOT NULL,
        postal_code            TEXT,
        model_year             INTEGER NOT NULL CHECK (model_year BETWEEN 1997 AND 2026),
        make                   TEXT NOT NULL CHECK (length(make) > 0 AND make = upper(trim(make))),
        model                  TEXT NOT NULL CHECK (length(model) > 0 AND model = upper(trim(model))),
        electric_vehicle_type  TEXT NOT NULL CHECK (length(electric_vehicle_type) > 0),
        cafv_eligibility       TEXT NOT NULL,
        electric_range         INTEGER NOT NULL CHECK (electric_range >= 0),
        base_msrp              INTEGER NOT NULL CHECK (base_msrp >= 0),
        legislative_district   TEXT,
        dol_vehicle_id         TEXT NOT NULL CHECK (length(trim(dol_vehicle_id)) > 0),
        vehicle_location       TEXT,
        electric_utility       TEXT,
        census_tract_2020      TEXT
    );
"#;

const INSERT_SQL: &str = "INSERT INTO vehicles (
        id, vin_1_10, county, city, state, postal_code, model_year, make, model,
        electric_vehicle_type, cafv_eligibility, electric_range, base_msrp,
        legislative_district, dol_vehicle_id, vehicle_location, electric_utility,
        census_tract_2020
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)";

const SELECT_COLUMNS: &str = "id, vin_1_10, county, city, state, postal_code, model_year, make, model,
        electric_vehicle_type, cafv_eligibility, electric_range, base_msrp,
        legislative_district, dol_vehicle_id, vehicle_location, electric_utility,
        census_tract_2020";

/// SQLite-backed document store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| {
            AnalyticsError::StoreConnection(format!("{}: {}", path.display(), e))
        })?;
        info!("Opened SQLite store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AnalyticsError::StoreConnection(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AnalyticsError::StoreConnection("connection lock poisoned".to_string()))
    }
}

fn store_err(e: rusqlite::Error) -> AnalyticsError {
    AnalyticsError::store(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

/// WHERE clause and its positional parameters
fn where_clause(filter: &VehicleFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    let sets = [
        ("make", &filter.makes),
        ("county", &filter.counties),
        ("electric_vehicle_type", &filter.vehicle_types),
    ];
    for (column, set) in sets {
        if let Some(set) = set {
            if set.is_empty() {
                conditions.push("0".to_string());
                continue;
            }
            let placeholders = vec!["?"; set.len()].join(", ");
            conditions.push(format!("{column} IN ({placeholders})"));
            values.extend(set.iter().cloned().map(Value::Text));
        }
    }

    if let Some(min) = filter.model_year_min {
        conditions.push("model_year >= ?".to_string());
        values.push(Value::Integer(min.into()));
    }
    if let Some(max) = filter.model_year_max {
        conditions.push("model_year <= ?".to_string());
        values.push(Value::Integer(max.into()));
    }
    if let Some(range) = filter.min_electric_range {
        conditions.push("electric_range >= ?".to_string());
        values.push(Value::Integer(range.into()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

/// Grouping expression; years are cast so every key reads back as text
fn tally_expr(field: TallyField) -> String {
    match field {
        TallyField::ModelYear => "CAST(model_year AS TEXT)".to_string(),
        other => other.column().to_string(),
    }
}

fn to_count(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| AnalyticsError::store(format!("negative aggregate {value}")))
}

fn to_sum(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| AnalyticsError::store(format!("negative aggregate {value}")))
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<(String, ValidatedVehicle)> {
    let id: String = row.get(0)?;
    let vehicle = ValidatedVehicle {
        vin_1_10: row.get(1)?,
        county: row.get(2)?,
        city: row.get(3)?,
        state: row.get(4)?,
        postal_code: row.get(5)?,
        model_year: row.get(6)?,
        make: row.get(7)?,
        model: row.get(8)?,
        electric_vehicle_type: row.get(9)?,
        cafv_eligibility: row.get(10)?,
        electric_range: row.get(11)?,
        base_msrp: row.get(12)?,
        legislative_district: row.get(13)?,
        dol_vehicle_id: row.get(14)?,
        vehicle_location: row.get(15)?,
        electric_utility: row.get(16)?,
        census_tract_2020: row.get(17)?,
    };
    Ok((id, vehicle))
}

#[async_trait]
impl VehicleStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AnalyticsError::StoreConnection(e.to_string()))?;
        Ok(())
    }

    async fn drop_all(&self) -> Result<()> {
        let indexes = self.list_indexes().await?;
        let conn = self.lock()?;
        for name in &indexes {
            conn.execute_batch(&format!("DROP INDEX IF EXISTS {name};"))
                .map_err(store_err)?;
        }
        conn.execute("DELETE FROM vehicles", []).map_err(store_err)?;
        debug!("Dropped {} indexes and all vehicle documents", indexes.len());
        Ok(())
    }

    async fn insert_many(&self, vehicles: &[ValidatedVehicle]) -> Result<InsertManyOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(store_err)?;
        let mut outcome = InsertManyOutcome::default();

        {
            let mut stmt = tx.prepare_cached(INSERT_SQL).map_err(store_err)?;
            for (index, v) in vehicles.iter().enumerate() {
                if let Err(message) = v.check_invariants() {
                    outcome.write_errors.push(DocumentWriteError { index, message });
                    continue;
                }
                let result = stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    v.vin_1_10,
                    v.county,
                    v.city,
                    v.state,
                    v.postal_code,
                    v.model_year,
                    v.make,
                    v.model,
                    v.electric_vehicle_type,
                    v.cafv_eligibility,
                    v.electric_range,
                    v.base_msrp,
                    v.legislative_district,
                    v.dol_vehicle_id,
                    v.vehicle_location,
                    v.electric_utility,
                    v.census_tract_2020,
                ]);
                match result {
                    Ok(_) => outcome.inserted += 1,
                    Err(e) if is_constraint_violation(&e) => {
                        outcome.write_errors.push(DocumentWriteError {
                            index,
                            message: e.to_string(),
                        });
                    }
                    Err(e) => return Err(store_err(e)),
                }
            }
        }

        tx.commit().map_err(store_err)?;
        Ok(outcome)
    }

    async fn create_indexes(&self, indexes: &[IndexSpec]) -> Result<()> {
        let conn = self.lock()?;
        for spec in indexes {
            let keys = spec
                .keys
                .iter()
                .map(|k| {
                    format!(
                        "{} {}",
                        k.field.column(),
                        if k.descending { "DESC" } else { "ASC" }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON vehicles ({});",
                spec.name, keys
            ))
            .map_err(store_err)?;
        }
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'index' AND tbl_name = 'vehicles' AND name NOT LIKE 'sqlite_%'",
            )
            .map_err(store_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(names)
    }

    async fn count(&self, filter: &VehicleFilter) -> Result<u64> {
        let (clause, values) = where_clause(filter);
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM vehicles{clause}"),
                params_from_iter(values),
                |row| row.get(0),
            )
            .map_err(store_err)?;
        Ok(count as u64)
    }

    async fn find(&self, filter: &VehicleFilter, options: &FindOptions) -> Result<Vec<VehicleDocument>> {
        let (clause, mut values) = where_clause(filter);
        let order = match options.sort {
            Some(sort) => format!(
                "{} {}, rowid ASC",
                sort.field.column(),
                match sort.order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                }
            ),
            None => "rowid ASC".to_string(),
        };
        // Clamp rather than wrap: a negative OFFSET would read as 0
        let limit = options
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        values.push(Value::Integer(limit));
        values.push(Value::Integer(i64::try_from(options.skip).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM vehicles{clause} ORDER BY {order} LIMIT ? OFFSET ?"
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), row_to_document)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;

        rows.into_iter()
            .map(|(id, vehicle)| {
                let id = Uuid::parse_str(&id)
                    .map_err(|e| AnalyticsError::store(format!("bad document id '{id}': {e}")))?;
                Ok(VehicleDocument { id, vehicle })
            })
            .collect()
    }

    async fn tally(&self, filter: &VehicleFilter, fields: &[TallyField]) -> Result<Vec<GroupTally>> {
        let (clause, values) = where_clause(filter);
        let keys = fields.iter().map(|f| tally_expr(*f)).collect::<Vec<_>>();
        let aggregates = "COUNT(*), COALESCE(SUM(electric_range), 0), \
            COALESCE(SUM(electric_range > 0), 0), \
            COALESCE(SUM(CASE WHEN electric_range > 0 THEN electric_range ELSE 0 END), 0)";
        let sql = if keys.is_empty() {
            format!("SELECT {aggregates} FROM vehicles{clause}")
        } else {
            let keys = keys.join(", ");
            format!(
                "SELECT {keys}, {aggregates} FROM vehicles{clause} GROUP BY {keys} ORDER BY {keys}"
            )
        };

        let width = fields.len();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                let key = (0..width)
                    .map(|i| row.get::<_, String>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let aggregates: [i64; 4] = [
                    row.get(width)?,
                    row.get(width + 1)?,
                    row.get(width + 2)?,
                    row.get(width + 3)?,
                ];
                Ok((key, aggregates))
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;

        let mut tallies = Vec::with_capacity(rows.len());
        for (key, [count, range_sum, ranged, ranged_sum]) in rows {
            let count = to_count(count)?;
            if count == 0 {
                continue;
            }
            tallies.push(GroupTally {
                key,
                count,
                range_sum: to_sum(range_sum)?,
                ranged: to_count(ranged)?,
                ranged_sum: to_sum(ranged_sum)?,
            });
        }
        debug!("Tallied {} groups over {:?}", tallies.len(), fields);
        Ok(tallies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{in_county, vehicle};
    use crate::pipeline::storage::{SortField, SortSpec, VEHICLE_INDEXES};
    use tempfile::TempDir;

    fn seeded() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_insert_count_and_filter() {
        let store = seeded();
        let outcome = store
            .insert_many(&[
                vehicle("TESLA", "MODEL 3", 2022, 272),
                vehicle("TESLA", "MODEL Y", 2023, 0),
                in_county(vehicle("NISSAN", "LEAF", 2019, 150), "PIERCE"),
            ])
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 3);

        assert_eq!(store.count(&VehicleFilter::all()).await.unwrap(), 3);
        assert_eq!(store.count(&VehicleFilter::make("TESLA")).await.unwrap(), 2);
        assert_eq!(store.count(&VehicleFilter::county("PIERCE")).await.unwrap(), 1);
        assert_eq!(
            store
                .count(&VehicleFilter::make("TESLA").with_model_year(2023))
                .await
                .unwrap(),
            1
        );
        let ranged = VehicleFilter {
            min_electric_range: Some(100),
            ..VehicleFilter::default()
        };
        assert_eq!(store.count(&ranged).await.unwrap(), 2);
        let empty_set = VehicleFilter {
            makes: Some(vec![]),
            ..VehicleFilter::default()
        };
        assert_eq!(store.count(&empty_set).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_documents_reported_per_index() {
        let store = seeded();
        let mut lower = vehicle("TESLA", "MODEL 3", 2022, 272);
        lower.county = "king".to_string();
        let old = vehicle("FORD", "RANGER", 1990, 0);

        let outcome = store
            .insert_many(&[lower, vehicle("KIA", "EV6", 2022, 310), old])
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        let indices: Vec<_> = outcome.write_errors.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(store.count(&VehicleFilter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_round_trips_documents_in_order() {
        let store = seeded();
        store
            .insert_many(&[
                vehicle("A", "ONE", 2020, 10),
                vehicle("B", "TWO", 2022, 20),
                vehicle("C", "THREE", 2020, 30),
            ])
            .await
            .unwrap();

        let options = FindOptions {
            sort: Some(SortSpec {
                field: SortField::ModelYear,
                order: SortOrder::Desc,
            }),
            skip: 0,
            limit: Some(10),
        };
        let docs = store.find(&VehicleFilter::all(), &options).await.unwrap();
        let makes: Vec<_> = docs.iter().map(|d| d.vehicle.make.as_str()).collect();
        assert_eq!(makes, vec!["B", "A", "C"]);
        assert_eq!(docs[2].vehicle, vehicle("C", "THREE", 2020, 30));

        let tail = FindOptions {
            skip: 2,
            ..FindOptions::default()
        };
        let docs = store.find(&VehicleFilter::all(), &tail).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].vehicle.make, "C");
    }

    #[tokio::test]
    async fn test_skip_beyond_i64_returns_empty_page() {
        let store = seeded();
        store.insert_many(&[vehicle("KIA", "EV6", 2022, 310)]).await.unwrap();

        let far = FindOptions {
            sort: None,
            skip: usize::MAX,
            limit: Some(usize::MAX),
        };
        assert!(store.find(&VehicleFilter::all(), &far).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tally_groups_in_sql() {
        let store = seeded();
        store
            .insert_many(&[
                vehicle("TESLA", "MODEL 3", 2022, 272),
                vehicle("TESLA", "MODEL 3", 2023, 0),
                vehicle("TESLA", "MODEL Y", 2022, 330),
                in_county(vehicle("NISSAN", "LEAF", 2019, 150), "PIERCE"),
            ])
            .await
            .unwrap();

        let by_model = store
            .tally(&VehicleFilter::make("TESLA"), &[TallyField::Model])
            .await
            .unwrap();
        assert_eq!(by_model.len(), 2);
        assert_eq!(by_model[0].key, vec!["MODEL 3"]);
        assert_eq!(by_model[0].count, 2);
        assert_eq!(by_model[0].range_sum, 272);
        assert_eq!(by_model[0].ranged, 1);

        let by_year = store
            .tally(&VehicleFilter::all(), &[TallyField::ModelYear, TallyField::County])
            .await
            .unwrap();
        assert_eq!(by_year[0].key, vec!["2019", "PIERCE"]);
        assert_eq!(by_year[1].count, 2);

        let nothing = store
            .tally(&VehicleFilter::make("DELOREAN"), &[TallyField::Model])
            .await
            .unwrap();
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn test_indexes_created_idempotently_and_dropped() {
        let store = seeded();
        store.create_indexes(&VEHICLE_INDEXES).await.unwrap();
        store.create_indexes(&VEHICLE_INDEXES).await.unwrap();

        let mut names = store.list_indexes().await.unwrap();
        names.sort();
        let mut expected: Vec<_> = VEHICLE_INDEXES.iter().map(|i| i.name.to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);

        store.insert_many(&[vehicle("KIA", "EV6", 2022, 310)]).await.unwrap();
        store.drop_all().await.unwrap();
        assert!(store.list_indexes().await.unwrap().is_empty());
        assert_eq!(store.count(&VehicleFilter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("vehicles.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.ping().await.unwrap();
            store.insert_many(&[vehicle("KIA", "EV6", 2022, 310)]).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.count(&VehicleFilter::all()).await.unwrap(), 1);
    }
}
