//! Embedded storage for motorpool.
//!
//! [`SqliteStore`] keeps vehicles, trip logs, and history rows in a local
//! `SQLite` database and implements [`Repository`] on top of it.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::history::{HistoryEntry, HistoryKind};
use crate::model::{LogPatch, NewTripLog, NewVehicle, TripLog, Vehicle, VehiclePatch};
use crate::repository::{publish, Change, Repository, CHANGE_CHANNEL_CAPACITY};
use crate::timestamp::Timestamp;

const VEHICLE_COLUMNS: &str =
    "id, plate, model, status, last_driver, location, project_id, memo";

const LOG_COLUMNS: &str =
    "id, vehicle_id, plate, model, driver, purpose, out_time, in_time, status, project_id";

/// `SQLite`-backed [`Repository`].
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    /// Change notifications for writes made through this store.
    changes: broadcast::Sender<Change>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self::from_connection(path, conn))
    }

    /// Create an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self::from_connection(PathBuf::from(":memory:"), conn))
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path,
            conn: Mutex::new(conn),
            changes,
        }
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get_vehicle(conn: &Connection, id: i64) -> Result<Option<Vehicle>> {
        let vehicle = conn
            .query_row(
                &format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = ?1"),
                [id],
                Self::row_to_vehicle,
            )
            .optional()?;
        Ok(vehicle)
    }

    fn get_log(conn: &Connection, id: i64) -> Result<Option<TripLog>> {
        let log = conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM logs WHERE id = ?1"),
                [id],
                Self::row_to_log,
            )
            .optional()?;
        Ok(log)
    }

    fn query_vehicles(conn: &Connection) -> Result<Vec<Vehicle>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles ORDER BY id ASC"
        ))?;
        let vehicles = stmt
            .query_map([], Self::row_to_vehicle)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(vehicles)
    }

    fn query_logs(conn: &Connection) -> Result<Vec<TripLog>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM logs ORDER BY id DESC"
        ))?;
        let mut logs = Vec::new();
        for row in stmt.query_map([], Self::row_to_log)? {
            match row {
                Ok(log) => logs.push(log),
                Err(e @ rusqlite::Error::FromSqlConversionFailure(..)) => {
                    warn!("Skipping unreadable trip log row: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(logs)
    }

    fn query_history(conn: &Connection, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = conn.prepare(
            r"
            SELECT kind, value, created_at FROM history_entries
            ORDER BY created_at DESC, id DESC LIMIT ?1
            ",
        )?;
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map([limit_i64], Self::row_to_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn write_vehicle(conn: &Connection, vehicle: &NewVehicle) -> Result<Vehicle> {
        conn.execute(
            r"
            INSERT INTO vehicles (plate, model, status, last_driver, location, project_id, memo)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                vehicle.plate,
                vehicle.model,
                vehicle.status.as_str(),
                vehicle.last_driver,
                vehicle.location,
                vehicle.project_id.as_str(),
                vehicle.memo,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Inserted vehicle with id {}", id);
        Ok(vehicle.clone().with_id(id))
    }

    fn patch_vehicle(conn: &mut Connection, id: i64, patch: &VehiclePatch) -> Result<Vehicle> {
        let tx = conn.transaction()?;
        let mut vehicle = Self::get_vehicle(&tx, id)?
            .ok_or_else(|| Error::remote(format!("vehicle {id} does not exist")))?;
        patch.apply(&mut vehicle);
        tx.execute(
            r"
            UPDATE vehicles SET status = ?1, last_driver = ?2, location = ?3, memo = ?4
            WHERE id = ?5
            ",
            params![
                vehicle.status.as_str(),
                vehicle.last_driver,
                vehicle.location,
                vehicle.memo,
                id,
            ],
        )?;
        tx.commit()?;
        Ok(vehicle)
    }

    fn write_log(conn: &Connection, log: &NewTripLog) -> Result<TripLog> {
        conn.execute(
            r"
            INSERT INTO logs (vehicle_id, plate, model, driver, purpose, out_time, in_time, status, project_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                log.vehicle_id,
                log.plate,
                log.model,
                log.driver,
                log.purpose,
                log.out_time.to_string(),
                log.in_time.map(|t| t.to_string()),
                log.status.as_str(),
                log.project_id.as_str(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Inserted trip log with id {}", id);
        Ok(log.clone().with_id(id))
    }

    fn patch_log(conn: &mut Connection, id: i64, patch: &LogPatch) -> Result<TripLog> {
        let tx = conn.transaction()?;
        let mut log = Self::get_log(&tx, id)?
            .ok_or_else(|| Error::remote(format!("log {id} does not exist")))?;
        patch.apply(&mut log);
        tx.execute(
            "UPDATE logs SET in_time = ?1, status = ?2 WHERE id = ?3",
            params![log.in_time.map(|t| t.to_string()), log.status.as_str(), id],
        )?;
        tx.commit()?;
        Ok(log)
    }

    fn row_to_vehicle(row: &rusqlite::Row) -> rusqlite::Result<Vehicle> {
        Ok(Vehicle {
            id: row.get(0)?,
            plate: row.get(1)?,
            model: row.get(2)?,
            status: parse_column(row, 3)?,
            last_driver: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            location: row.get(5)?,
            project_id: parse_column(row, 6)?,
            memo: row.get(7)?,
        })
    }

    fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<TripLog> {
        let in_time: Option<String> = row.get(7)?;
        Ok(TripLog {
            id: row.get(0)?,
            vehicle_id: row.get(1)?,
            plate: row.get(2)?,
            model: row.get(3)?,
            driver: row.get(4)?,
            purpose: row.get(5)?,
            out_time: parse_column(row, 6)?,
            in_time: in_time
                .map(|raw| parse_text::<Timestamp>(7, &raw))
                .transpose()?,
            status: parse_column(row, 8)?,
            project_id: parse_column(row, 9)?,
        })
    }

    fn row_to_history(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let created_at: String = row.get(2)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));
        Ok(HistoryEntry {
            kind: parse_column(row, 0)?,
            value: row.get(1)?,
            created_at,
        })
    }
}

fn parse_column<T: FromStr<Err = Error>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse_text(idx, &raw)
}

fn parse_text<T: FromStr<Err = Error>>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    raw.parse()
        .map_err(|e: Error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[async_trait]
impl Repository for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>> {
        let conn = self.conn.lock().await;
        Self::query_vehicles(&conn)
    }

    async fn list_logs(&self) -> Result<Vec<TripLog>> {
        let conn = self.conn.lock().await;
        Self::query_logs(&conn)
    }

    async fn insert_vehicle(&self, vehicle: &NewVehicle) -> Result<Vehicle> {
        let stored = {
            let conn = self.conn.lock().await;
            Self::write_vehicle(&conn, vehicle)?
        };
        publish(&self.changes, Change::VehicleInserted(stored.clone()));
        Ok(stored)
    }

    async fn update_vehicle(&self, id: i64, patch: &VehiclePatch) -> Result<Vehicle> {
        let updated = {
            let mut conn = self.conn.lock().await;
            Self::patch_vehicle(&mut conn, id, patch)?
        };
        publish(&self.changes, Change::VehicleUpdated(updated.clone()));
        Ok(updated)
    }

    async fn delete_vehicle(&self, id: i64) -> Result<()> {
        let affected = {
            let conn = self.conn.lock().await;
            conn.execute("DELETE FROM vehicles WHERE id = ?1", [id])?
        };
        debug!("Deleted vehicle {} ({} rows)", id, affected);
        publish(&self.changes, Change::VehicleDeleted(id));
        Ok(())
    }

    async fn insert_log(&self, log: &NewTripLog) -> Result<TripLog> {
        let stored = {
            let conn = self.conn.lock().await;
            Self::write_log(&conn, log)?
        };
        publish(&self.changes, Change::LogInserted(stored.clone()));
        Ok(stored)
    }

    async fn update_log(&self, id: i64, patch: &LogPatch) -> Result<TripLog> {
        let updated = {
            let mut conn = self.conn.lock().await;
            Self::patch_log(&mut conn, id, patch)?
        };
        publish(&self.changes, Change::LogUpdated(updated.clone()));
        Ok(updated)
    }

    async fn delete_log(&self, id: i64) -> Result<()> {
        let affected = {
            let conn = self.conn.lock().await;
            conn.execute("DELETE FROM logs WHERE id = ?1", [id])?
        };
        debug!("Deleted trip log {} ({} rows)", id, affected);
        publish(&self.changes, Change::LogDeleted(id));
        Ok(())
    }

    async fn insert_history(&self, kind: HistoryKind, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO history_entries (kind, value, created_at) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().await;
        Self::query_history(&conn, limit)
    }

    fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, TripStatus, VehicleStatus, IN_TRANSIT_LOCATION};

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to create test store")
    }

    fn new_vehicle(plate: &str) -> NewVehicle {
        NewVehicle::available(plate, "K5", "평택 사무실 앞", Project::Pure)
    }

    fn stamp(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let store = create_test_store();
        assert_eq!(store.path().to_string_lossy(), ":memory:");
        assert!(store.list_vehicles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_list_vehicles() {
        let store = create_test_store();
        let a = store.insert_vehicle(&new_vehicle("170허8468")).await.unwrap();
        let b = store.insert_vehicle(&new_vehicle("721하5723")).await.unwrap();

        let vehicles = store.list_vehicles().await.unwrap();
        assert_eq!(vehicles, vec![a, b]);
        assert_eq!(vehicles[0].status, VehicleStatus::Available);
        assert!(vehicles[0].memo.is_none());
    }

    #[tokio::test]
    async fn test_update_vehicle_patch() {
        let store = create_test_store();
        let vehicle = store.insert_vehicle(&new_vehicle("170허8468")).await.unwrap();

        let patch = VehiclePatch {
            status: Some(VehicleStatus::InUse),
            last_driver: Some("Kim".to_string()),
            location: Some(IN_TRANSIT_LOCATION.to_string()),
            memo: Some(Some("주유 필요".to_string())),
        };
        let updated = store.update_vehicle(vehicle.id, &patch).await.unwrap();

        assert_eq!(updated.status, VehicleStatus::InUse);
        assert_eq!(updated.memo.as_deref(), Some("주유 필요"));
        assert_eq!(store.list_vehicles().await.unwrap()[0], updated);

        let clear = VehiclePatch {
            memo: Some(None),
            ..VehiclePatch::default()
        };
        let cleared = store.update_vehicle(vehicle.id, &clear).await.unwrap();
        assert!(cleared.memo.is_none());
        assert_eq!(cleared.last_driver, "Kim");
    }

    #[tokio::test]
    async fn test_update_missing_vehicle() {
        let store = create_test_store();
        let err = store
            .update_vehicle(99, &VehiclePatch::default())
            .await
            .unwrap_err();
        assert!(err.is_remote());
    }

    #[tokio::test]
    async fn test_log_lifecycle() {
        let store = create_test_store();
        let vehicle = store.insert_vehicle(&new_vehicle("170허8468")).await.unwrap();

        let trip = NewTripLog::departing(&vehicle, "Kim", "Meeting", stamp("2024-01-05 10:00"));
        let stored = store.insert_log(&trip).await.unwrap();
        assert!(stored.is_ongoing());
        assert!(stored.in_time.is_none());

        let done = store
            .update_log(stored.id, &LogPatch::complete(stamp("2024-01-05 12:30")))
            .await
            .unwrap();
        assert_eq!(done.status, TripStatus::Completed);
        assert_eq!(done.in_time, Some(stamp("2024-01-05 12:30")));

        let logs = store.list_logs().await.unwrap();
        assert_eq!(logs, vec![done]);
    }

    #[tokio::test]
    async fn test_logs_listed_newest_first() {
        let store = create_test_store();
        let vehicle = store.insert_vehicle(&new_vehicle("170허8468")).await.unwrap();
        for driver in ["Kim", "Lee", "Park"] {
            let trip = NewTripLog::departing(&vehicle, driver, "x", stamp("2024-01-05 10:00"));
            store.insert_log(&trip).await.unwrap();
        }

        let drivers: Vec<String> = store
            .list_logs()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.driver)
            .collect();
        assert_eq!(drivers, ["Park", "Lee", "Kim"]);
    }

    #[tokio::test]
    async fn test_list_logs_reads_legacy_times_and_skips_unreadable_rows() {
        let store = create_test_store();
        let vehicle = store.insert_vehicle(&new_vehicle("170허8468")).await.unwrap();
        let trip = NewTripLog::departing(&vehicle, "Kim", "x", stamp("2024-01-05 10:00"));
        let good = store.insert_log(&trip).await.unwrap();
        {
            let conn = store.conn.lock().await;
            let insert = "INSERT INTO logs (vehicle_id, plate, model, driver, purpose, \
                          out_time, in_time, status, project_id) \
                          VALUES (?1, '170허8468', 'K5', ?2, 'x', ?3, NULL, 'ongoing', 'pure')";
            conn.execute(insert, params![vehicle.id, "Lee", "2024. 1. 5. 오후 03:10"])
                .unwrap();
            conn.execute(insert, params![vehicle.id, "Park", "sometime"])
                .unwrap();
        }

        let logs = store.list_logs().await.unwrap();

        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].driver, "Lee");
        assert_eq!(logs[0].out_time, stamp("2024-01-05 15:10"));
        assert_eq!(logs[1], good);
    }

    #[tokio::test]
    async fn test_delete_vehicle_keeps_logs() {
        let store = create_test_store();
        let vehicle = store.insert_vehicle(&new_vehicle("170허8468")).await.unwrap();
        let trip = NewTripLog::departing(&vehicle, "Kim", "x", stamp("2024-01-05 10:00"));
        store.insert_log(&trip).await.unwrap();

        store.delete_vehicle(vehicle.id).await.unwrap();

        assert!(store.list_vehicles().await.unwrap().is_empty());
        assert_eq!(store.list_logs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = create_test_store();
        assert!(store.delete_vehicle(12345).await.is_ok());
        assert!(store.delete_log(12345).await.is_ok());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let store = create_test_store();
        store.insert_history(HistoryKind::Driver, "Kim").await.unwrap();
        store.insert_history(HistoryKind::Purpose, "Bank").await.unwrap();
        store.insert_history(HistoryKind::Driver, "Lee").await.unwrap();

        let rows = store.recent_history(2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, "Lee");
        assert_eq!(rows[1].kind, HistoryKind::Purpose);
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let store = create_test_store();
        let mut rx = store.subscribe();

        let vehicle = store.insert_vehicle(&new_vehicle("170허8468")).await.unwrap();
        store.delete_vehicle(vehicle.id).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), Change::VehicleInserted(vehicle.clone()));
        assert_eq!(rx.recv().await.unwrap(), Change::VehicleDeleted(vehicle.id));
    }

    #[tokio::test]
    async fn test_unknown_status_is_rejected() {
        let store = create_test_store();
        {
            let conn = store.conn.lock().await;
            conn.execute(
                "INSERT INTO vehicles (plate, model, status, location, project_id) VALUES ('x', 'y', 'parked', 'z', 'green')",
                [],
            )
            .unwrap();
        }
        assert!(store.list_vehicles().await.is_err());
    }

    #[tokio::test]
    async fn test_open_file_based() {
        let temp_dir = std::env::temp_dir();
        let db_path = temp_dir.join(format!("motorpool_test_{}.db", std::process::id()));

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.insert_vehicle(&new_vehicle("170허8468")).await.unwrap();
            assert_eq!(store.path(), db_path);
        }

        // Reopen and read back.
        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.list_vehicles().await.unwrap().len(), 1);

        drop(store);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let temp_dir = std::env::temp_dir();
        let nested_path = temp_dir.join(format!(
            "motorpool_test_{}/nested/fleet.db",
            std::process::id()
        ));

        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }

        let store = SqliteStore::open(&nested_path).unwrap();
        assert!(nested_path.exists());

        drop(store);
        if let Some(parent) = nested_path.parent().and_then(Path::parent) {
            let _ = std::fs::remove_dir_all(parent);
        }
    }
}
