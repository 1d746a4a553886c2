//! The store abstraction behind the fleet ledger.
//!
//! A [`Repository`] reads and writes vehicles, trip logs, and history rows,
//! and publishes a [`Change`] for every write it performs. Three backends
//! are provided:
//!
//! - [`crate::storage::SqliteStore`]: embedded `SQLite` database
//! - [`RestStore`]: a hosted database behind a `PostgREST` endpoint
//! - [`MemoryStore`]: in-process, with failure injection for tests

mod memory;
mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::{Backend, Config};
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, HistoryKind};
use crate::model::{LogPatch, NewTripLog, NewVehicle, TripLog, Vehicle, VehiclePatch};
use crate::storage::SqliteStore;

pub use memory::{FailPoint, MemoryStore};
pub use rest::RestStore;

/// Capacity of each backend's change channel.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A row-level change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A vehicle row was created.
    VehicleInserted(Vehicle),
    /// A vehicle row was modified.
    VehicleUpdated(Vehicle),
    /// A vehicle row was removed.
    VehicleDeleted(i64),
    /// A trip row was created.
    LogInserted(TripLog),
    /// A trip row was modified.
    LogUpdated(TripLog),
    /// A trip row was removed.
    LogDeleted(i64),
}

/// Persistent storage for the fleet.
///
/// Writes return the stored row. Deletes succeed whether or not the row
/// existed.
#[async_trait]
pub trait Repository: Send + Sync + std::fmt::Debug {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// All vehicles, ascending by id.
    async fn list_vehicles(&self) -> Result<Vec<Vehicle>>;

    /// All trip logs, descending by id (newest first).
    async fn list_logs(&self) -> Result<Vec<TripLog>>;

    /// Store a new vehicle.
    async fn insert_vehicle(&self, vehicle: &NewVehicle) -> Result<Vehicle>;

    /// Modify a vehicle.
    async fn update_vehicle(&self, id: i64, patch: &VehiclePatch) -> Result<Vehicle>;

    /// Remove a vehicle.
    async fn delete_vehicle(&self, id: i64) -> Result<()>;

    /// Store a new trip log.
    async fn insert_log(&self, log: &NewTripLog) -> Result<TripLog>;

    /// Modify a trip log.
    async fn update_log(&self, id: i64, patch: &LogPatch) -> Result<TripLog>;

    /// Remove a trip log.
    async fn delete_log(&self, id: i64) -> Result<()>;

    /// Record a history value.
    async fn insert_history(&self, kind: HistoryKind, value: &str) -> Result<()>;

    /// The most recent history rows, newest first.
    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Receive change notifications for writes made from now on.
    fn subscribe(&self) -> broadcast::Receiver<Change>;
}

/// Open the backend selected in `config`.
///
/// The memory backend starts with the built-in fleet.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the remote store
/// settings are unusable.
pub fn open(config: &Config) -> Result<Arc<dyn Repository>> {
    let repo: Arc<dyn Repository> = match config.store.backend {
        Backend::Sqlite => Arc::new(SqliteStore::open(config.database_path())?),
        Backend::Postgrest => {
            let url = config
                .store
                .url
                .as_deref()
                .ok_or_else(|| Error::missing_field("store.url"))?;
            let api_key = config
                .store
                .api_key
                .clone()
                .ok_or_else(|| Error::missing_field("store.api_key"))?;
            Arc::new(RestStore::new(url, api_key, config.timeout())?)
        }
        Backend::Memory => Arc::new(MemoryStore::with_vehicles(Vehicle::default_fleet())),
    };
    info!("Using {} store", repo.name());
    Ok(repo)
}

/// Publish a change, ignoring the case where nobody is listening.
pub(crate) fn publish(sender: &broadcast::Sender<Change>, change: Change) {
    let _ = sender.send(change);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_backend_has_default_fleet() {
        let mut config = Config::default();
        config.store.backend = Backend::Memory;

        let repo = open(&config).unwrap();
        assert_eq!(repo.name(), "memory");
        assert_eq!(repo.list_vehicles().await.unwrap().len(), 7);
    }

    #[test]
    fn test_open_sqlite_backend() {
        let path = std::env::temp_dir().join(format!(
            "motorpool_open_test_{}.db",
            std::process::id()
        ));
        let mut config = Config::default();
        config.store.database_path = Some(path.clone());

        let repo = open(&config).unwrap();
        assert_eq!(repo.name(), "sqlite");

        drop(repo);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }

    #[test]
    fn test_open_postgrest_without_url_fails() {
        let mut config = Config::default();
        config.store.backend = Backend::Postgrest;

        let err = open(&config).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "store.url" }));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        publish(&sender, Change::VehicleDeleted(1));
    }
}
