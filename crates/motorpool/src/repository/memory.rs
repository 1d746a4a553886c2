//! In-process repository.
//!
//! Keeps rows in vectors behind a mutex. Individual operations can be made
//! to fail with [`MemoryStore::fail_on`] to exercise error paths.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use super::{publish, Change, Repository, CHANGE_CHANNEL_CAPACITY};
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, HistoryKind};
use crate::model::{LogPatch, NewTripLog, NewVehicle, TripLog, Vehicle, VehiclePatch};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Listing vehicles or logs.
    Read,
    /// [`Repository::insert_vehicle`].
    InsertVehicle,
    /// [`Repository::update_vehicle`].
    UpdateVehicle,
    /// [`Repository::delete_vehicle`].
    DeleteVehicle,
    /// [`Repository::insert_log`].
    InsertLog,
    /// [`Repository::update_log`].
    UpdateLog,
    /// [`Repository::delete_log`].
    DeleteLog,
    /// History reads and writes.
    History,
}

#[derive(Debug, Default)]
struct Tables {
    vehicles: Vec<Vehicle>,
    logs: Vec<TripLog>,
    history: Vec<HistoryEntry>,
    next_vehicle_id: i64,
    next_log_id: i64,
}

/// An in-memory [`Repository`].
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: Mutex<HashSet<FailPoint>>,
    changes: broadcast::Sender<Change>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_vehicles(Vec::new())
    }

    /// A store pre-populated with vehicles. Ids are kept as given.
    #[must_use]
    pub fn with_vehicles(vehicles: Vec<Vehicle>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let next_vehicle_id = vehicles.iter().map(|v| v.id).max().unwrap_or(0) + 1;
        Self {
            tables: Mutex::new(Tables {
                vehicles,
                next_vehicle_id,
                next_log_id: 1,
                ..Tables::default()
            }),
            failing: Mutex::new(HashSet::new()),
            changes,
        }
    }

    /// Make `point` fail until [`MemoryStore::clear_failures`] is called.
    pub async fn fail_on(&self, point: FailPoint) {
        self.failing.lock().await.insert(point);
    }

    /// Stop injecting failures.
    pub async fn clear_failures(&self) {
        self.failing.lock().await.clear();
    }

    /// Snapshot of stored vehicles.
    pub async fn vehicles(&self) -> Vec<Vehicle> {
        self.tables.lock().await.vehicles.clone()
    }

    /// Snapshot of stored logs, in insertion order.
    pub async fn logs(&self) -> Vec<TripLog> {
        self.tables.lock().await.logs.clone()
    }

    /// Snapshot of stored history rows, in insertion order.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.tables.lock().await.history.clone()
    }

    async fn check(&self, point: FailPoint) -> Result<()> {
        if self.failing.lock().await.contains(&point) {
            debug!("Injected failure at {:?}", point);
            return Err(Error::remote(format!("injected failure: {point:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>> {
        self.check(FailPoint::Read).await?;
        let mut vehicles = self.vehicles().await;
        vehicles.sort_by_key(|v| v.id);
        Ok(vehicles)
    }

    async fn list_logs(&self) -> Result<Vec<TripLog>> {
        self.check(FailPoint::Read).await?;
        let mut logs = self.logs().await;
        logs.sort_by_key(|l| std::cmp::Reverse(l.id));
        Ok(logs)
    }

    async fn insert_vehicle(&self, vehicle: &NewVehicle) -> Result<Vehicle> {
        self.check(FailPoint::InsertVehicle).await?;
        let stored = {
            let mut tables = self.tables.lock().await;
            let stored = vehicle.clone().with_id(tables.next_vehicle_id);
            tables.next_vehicle_id += 1;
            tables.vehicles.push(stored.clone());
            stored
        };
        publish(&self.changes, Change::VehicleInserted(stored.clone()));
        Ok(stored)
    }

    async fn update_vehicle(&self, id: i64, patch: &VehiclePatch) -> Result<Vehicle> {
        self.check(FailPoint::UpdateVehicle).await?;
        let updated = {
            let mut tables = self.tables.lock().await;
            let vehicle = tables
                .vehicles
                .iter_mut()
                .find(|v| v.id == id)
                .ok_or_else(|| Error::remote(format!("vehicle {id} does not exist")))?;
            patch.apply(vehicle);
            vehicle.clone()
        };
        publish(&self.changes, Change::VehicleUpdated(updated.clone()));
        Ok(updated)
    }

    async fn delete_vehicle(&self, id: i64) -> Result<()> {
        self.check(FailPoint::DeleteVehicle).await?;
        self.tables.lock().await.vehicles.retain(|v| v.id != id);
        publish(&self.changes, Change::VehicleDeleted(id));
        Ok(())
    }

    async fn insert_log(&self, log: &NewTripLog) -> Result<TripLog> {
        self.check(FailPoint::InsertLog).await?;
        let stored = {
            let mut tables = self.tables.lock().await;
            let stored = log.clone().with_id(tables.next_log_id);
            tables.next_log_id += 1;
            tables.logs.push(stored.clone());
            stored
        };
        publish(&self.changes, Change::LogInserted(stored.clone()));
        Ok(stored)
    }

    async fn update_log(&self, id: i64, patch: &LogPatch) -> Result<TripLog> {
        self.check(FailPoint::UpdateLog).await?;
        let updated = {
            let mut tables = self.tables.lock().await;
            let log = tables
                .logs
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or_else(|| Error::remote(format!("log {id} does not exist")))?;
            patch.apply(log);
            log.clone()
        };
        publish(&self.changes, Change::LogUpdated(updated.clone()));
        Ok(updated)
    }

    async fn delete_log(&self, id: i64) -> Result<()> {
        self.check(FailPoint::DeleteLog).await?;
        self.tables.lock().await.logs.retain(|l| l.id != id);
        publish(&self.changes, Change::LogDeleted(id));
        Ok(())
    }

    async fn insert_history(&self, kind: HistoryKind, value: &str) -> Result<()> {
        self.check(FailPoint::History).await?;
        self.tables.lock().await.history.push(HistoryEntry {
            kind,
            value: value.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        self.check(FailPoint::History).await?;
        let tables = self.tables.lock().await;
        Ok(tables.history.iter().rev().take(limit).cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}
