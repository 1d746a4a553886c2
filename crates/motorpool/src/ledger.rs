//! The fleet ledger.
//!
//! [`FleetLedger`] holds the working copy of vehicles, trip logs, and the
//! recency lists, and drives every state transition through a
//! [`Repository`]. Local state only changes after the store has
//! acknowledged the write. After each change the state is mirrored to the
//! [`LocalCache`], when one is attached.
//!
//! Hydration runs in a fixed order: built-in fleet, then the cache, then
//! the store. Each store collection that reads successfully replaces
//! whatever the earlier steps produced.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::LocalCache;
use crate::error::{Error, Result};
use crate::history::{lists_from_entries, HistoryKind, RecentList, HISTORY_FETCH_LIMIT};
use crate::model::{
    LogPatch, NewTripLog, NewVehicle, Project, TripLog, Vehicle, VehiclePatch, VehicleStatus,
    IN_TRANSIT_LOCATION,
};
use crate::repository::{Change, Repository};
use crate::timestamp::Timestamp;

/// Rules that are deliberately configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// When a vehicle is in use but has no ongoing trip, let check-in
    /// return it anyway instead of failing.
    pub allow_orphan_check_in: bool,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            allow_orphan_check_in: true,
        }
    }
}

/// Working state of the fleet.
#[derive(Debug)]
pub struct FleetLedger {
    repo: Arc<dyn Repository>,
    vehicles: Vec<Vehicle>,
    logs: Vec<TripLog>,
    drivers: RecentList,
    purposes: RecentList,
    project: Project,
    policy: LedgerPolicy,
    cache: Option<LocalCache>,
    clock: fn() -> Timestamp,
    history_writes: Vec<JoinHandle<()>>,
}

impl FleetLedger {
    /// A ledger seeded with the default fleet and no logs.
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            vehicles: Vehicle::default_fleet(),
            logs: Vec::new(),
            drivers: RecentList::new(),
            purposes: RecentList::new(),
            project: Project::default(),
            policy: LedgerPolicy::default(),
            cache: None,
            clock: Timestamp::now,
            history_writes: Vec::new(),
        }
    }

    /// Use `policy`.
    #[must_use]
    pub fn with_policy(mut self, policy: LedgerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start on `project`.
    #[must_use]
    pub fn with_project(mut self, project: Project) -> Self {
        self.project = project;
        self
    }

    /// Mirror state into `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: LocalCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Take trip times from `clock` instead of the system time.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    // === Hydration ===

    /// Run the full startup sequence: cache, store, history.
    pub async fn hydrate(&mut self) {
        self.hydrate_from_cache();
        self.hydrate_from_remote().await;
        self.load_history().await;
    }

    /// Replace state with the cached slots, if present.
    pub fn hydrate_from_cache(&mut self) {
        let Some(cache) = &self.cache else {
            return;
        };

        if let Some(state) = cache.load_state() {
            debug!(
                "Loaded {} vehicles and {} logs from cache",
                state.vehicles.len(),
                state.logs.len()
            );
            self.vehicles = state.vehicles;
            self.logs = state.logs;
        }

        if let Some(history) = cache.load_history() {
            self.drivers = history.driver_history;
            self.purposes = history.purpose_history;
        }
    }

    /// Replace each collection the store returns. Read failures keep the
    /// current data.
    pub async fn hydrate_from_remote(&mut self) {
        match self.repo.list_vehicles().await {
            Ok(vehicles) => {
                debug!("Loaded {} vehicles from {}", vehicles.len(), self.repo.name());
                self.vehicles = vehicles;
            }
            Err(e) => warn!("Keeping local vehicles, store read failed: {}", e),
        }

        match self.repo.list_logs().await {
            Ok(logs) => {
                debug!("Loaded {} logs from {}", logs.len(), self.repo.name());
                self.logs = logs;
            }
            Err(e) => warn!("Keeping local logs, store read failed: {}", e),
        }

        self.mirror_state();
    }

    /// Rebuild the recency lists from stored history rows.
    ///
    /// A list is only replaced when the store has at least one value for it.
    pub async fn load_history(&mut self) {
        let entries = match self.repo.recent_history(HISTORY_FETCH_LIMIT).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("History prefetch failed: {}", e);
                return;
            }
        };

        let (drivers, purposes) = lists_from_entries(&entries);
        if !drivers.is_empty() {
            self.drivers = drivers;
        }
        if !purposes.is_empty() {
            self.purposes = purposes;
        }
        self.mirror_history();
    }

    // === Transitions ===

    /// Take a vehicle out.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the vehicle is not in the active
    /// project, is not available, or `driver`/`purpose` is blank. Returns a
    /// store error if either write fails; the trip row is removed again if
    /// the vehicle update is the one that failed.
    pub async fn check_out(&mut self, vehicle_id: i64, driver: &str, purpose: &str) -> Result<TripLog> {
        let vehicle = self.scoped_vehicle(vehicle_id)?.clone();
        if !vehicle.is_available() {
            return Err(Error::InvalidTransition {
                plate: vehicle.plate,
                action: "check out",
                status: vehicle.status.to_string(),
            });
        }

        let driver = required(driver, "driver")?;
        let purpose = required(purpose, "purpose")?;

        let trip = NewTripLog::departing(&vehicle, driver, purpose, (self.clock)());
        let log = self.repo.insert_log(&trip).await?;

        let patch = VehiclePatch {
            status: Some(VehicleStatus::InUse),
            last_driver: Some(driver.to_string()),
            location: Some(IN_TRANSIT_LOCATION.to_string()),
            memo: None,
        };
        let updated = match self.repo.update_vehicle(vehicle.id, &patch).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Err(undo) = self.repo.delete_log(log.id).await {
                    warn!("Failed to remove trip {} after checkout failed: {}", log.id, undo);
                }
                return Err(e);
            }
        };

        upsert_vehicle(&mut self.vehicles, updated);
        upsert_log(&mut self.logs, log.clone());
        info!("Checked out {} to {}", vehicle.plate, driver);

        self.drivers.push(driver);
        self.purposes.push(purpose);
        self.record_history(driver, purpose);

        self.mirror_state();
        self.mirror_history();
        Ok(log)
    }

    /// Return a vehicle and park it at `location`.
    ///
    /// Returns the completed trip, or `None` when the vehicle had no ongoing
    /// trip and the policy allowed the check-in anyway. `last_driver` is
    /// left as it was.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the vehicle is not in the active
    /// project, is not in use, `location` is blank, or there is no ongoing
    /// trip under the strict policy. Returns a store error if either write
    /// fails; the trip is reopened if the vehicle update is the one that
    /// failed.
    pub async fn check_in(&mut self, vehicle_id: i64, location: &str) -> Result<Option<TripLog>> {
        let vehicle = self.scoped_vehicle(vehicle_id)?.clone();
        if vehicle.status != VehicleStatus::InUse {
            return Err(Error::InvalidTransition {
                plate: vehicle.plate,
                action: "check in",
                status: vehicle.status.to_string(),
            });
        }

        let location = required(location, "location")?;

        let ongoing = self.ongoing_log(vehicle.id).map(|log| log.id);
        let completed = match ongoing {
            Some(log_id) => Some(
                self.repo
                    .update_log(log_id, &LogPatch::complete((self.clock)()))
                    .await?,
            ),
            None if self.policy.allow_orphan_check_in => {
                warn!("Vehicle {} has no ongoing trip, returning it anyway", vehicle.plate);
                None
            }
            None => return Err(Error::NoOngoingTrip { plate: vehicle.plate }),
        };

        let patch = VehiclePatch {
            status: Some(VehicleStatus::Available),
            location: Some(location.to_string()),
            ..VehiclePatch::default()
        };
        let updated = match self.repo.update_vehicle(vehicle.id, &patch).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(log) = &completed {
                    if let Err(undo) = self.repo.update_log(log.id, &LogPatch::reopen()).await {
                        warn!("Failed to reopen trip {} after check-in failed: {}", log.id, undo);
                    }
                }
                return Err(e);
            }
        };

        upsert_vehicle(&mut self.vehicles, updated);
        if let Some(log) = &completed {
            upsert_log(&mut self.logs, log.clone());
        }
        info!("Checked in {} at {}", vehicle.plate, location);

        self.mirror_state();
        Ok(completed)
    }

    /// Set or clear a vehicle's note. Blank text clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if the vehicle is not in the active project or the
    /// store rejects the write.
    pub async fn update_memo(&mut self, vehicle_id: i64, text: &str) -> Result<Vehicle> {
        let id = self.scoped_vehicle(vehicle_id)?.id;
        let text = text.trim();
        let patch = VehiclePatch {
            memo: Some((!text.is_empty()).then(|| text.to_string())),
            ..VehiclePatch::default()
        };

        let updated = self.repo.update_vehicle(id, &patch).await?;
        upsert_vehicle(&mut self.vehicles, updated.clone());
        self.mirror_state();
        Ok(updated)
    }

    /// Register a new vehicle in the active project.
    ///
    /// # Errors
    ///
    /// Returns an error if any field is blank or the store rejects the write.
    pub async fn add_vehicle(&mut self, plate: &str, model: &str, location: &str) -> Result<Vehicle> {
        let vehicle = NewVehicle::available(
            required(plate, "plate")?,
            required(model, "model")?,
            required(location, "location")?,
            self.project,
        );

        let stored = self.repo.insert_vehicle(&vehicle).await?;
        info!("Added vehicle {} ({})", stored.plate, stored.id);
        upsert_vehicle(&mut self.vehicles, stored.clone());
        self.mirror_state();
        Ok(stored)
    }

    /// Remove a vehicle. Its trips are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub async fn delete_vehicle(&mut self, vehicle_id: i64) -> Result<()> {
        self.repo.delete_vehicle(vehicle_id).await?;
        self.vehicles.retain(|v| v.id != vehicle_id);
        self.mirror_state();
        Ok(())
    }

    /// Remove a trip log.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub async fn delete_log(&mut self, log_id: i64) -> Result<()> {
        self.repo.delete_log(log_id).await?;
        self.logs.retain(|l| l.id != log_id);
        self.mirror_state();
        Ok(())
    }

    /// Insert the built-in fleet when the store has no vehicles.
    ///
    /// Returns the number of vehicles inserted. Store ids replace the
    /// built-in ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or an insert fails.
    pub async fn seed_default_fleet(&mut self) -> Result<usize> {
        if !self.repo.list_vehicles().await?.is_empty() {
            debug!("Store already has vehicles, not seeding");
            return Ok(0);
        }

        let fleet = Vehicle::default_fleet();
        let mut stored = Vec::with_capacity(fleet.len());
        for vehicle in &fleet {
            stored.push(self.repo.insert_vehicle(&NewVehicle::from(vehicle)).await?);
        }
        info!("Seeded {} vehicles", stored.len());

        let count = stored.len();
        self.vehicles = stored;
        self.mirror_state();
        Ok(count)
    }

    /// Apply a change notification. Applying the same change twice leaves
    /// the same state.
    pub fn apply_change(&mut self, change: Change) {
        match change {
            Change::VehicleInserted(vehicle) => upsert_vehicle(&mut self.vehicles, vehicle),
            Change::VehicleUpdated(vehicle) => {
                if let Some(slot) = self.vehicles.iter_mut().find(|v| v.id == vehicle.id) {
                    *slot = vehicle;
                } else {
                    debug!("Ignoring update for unknown vehicle {}", vehicle.id);
                }
            }
            Change::VehicleDeleted(id) => self.vehicles.retain(|v| v.id != id),
            Change::LogInserted(log) => upsert_log(&mut self.logs, log),
            Change::LogUpdated(log) => {
                if let Some(slot) = self.logs.iter_mut().find(|l| l.id == log.id) {
                    *slot = log;
                } else {
                    debug!("Ignoring update for unknown log {}", log.id);
                }
            }
            Change::LogDeleted(id) => self.logs.retain(|l| l.id != id),
        }
        self.mirror_state();
    }

    /// Switch the active site.
    pub fn set_project(&mut self, project: Project) {
        if self.project != project {
            debug!("Switching project to {}", project);
        }
        self.project = project;
    }

    /// Receive change notifications from the store.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.repo.subscribe()
    }

    /// Wait for queued history writes. Failures were already logged.
    pub async fn settle(&mut self) {
        for write in self.history_writes.drain(..) {
            if let Err(e) = write.await {
                warn!("History write task failed: {}", e);
            }
        }
    }

    // === Views ===

    /// The active site.
    #[must_use]
    pub fn project(&self) -> Project {
        self.project
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    /// The backing store.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Vehicles in the active site.
    #[must_use]
    pub fn vehicles(&self) -> Vec<Vehicle> {
        self.vehicles
            .iter()
            .filter(|v| v.project_id == self.project)
            .cloned()
            .collect()
    }

    /// Trip logs in the active site, newest first.
    #[must_use]
    pub fn logs(&self) -> Vec<TripLog> {
        self.logs
            .iter()
            .filter(|l| l.project_id == self.project)
            .cloned()
            .collect()
    }

    /// Every vehicle, regardless of site.
    #[must_use]
    pub fn all_vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    /// Every trip log, regardless of site.
    #[must_use]
    pub fn all_logs(&self) -> &[TripLog] {
        &self.logs
    }

    /// Recently used driver names.
    #[must_use]
    pub fn driver_history(&self) -> &RecentList {
        &self.drivers
    }

    /// Recently used purposes.
    #[must_use]
    pub fn purpose_history(&self) -> &RecentList {
        &self.purposes
    }

    /// The running trip for a vehicle in the active site.
    #[must_use]
    pub fn ongoing_log(&self, vehicle_id: i64) -> Option<&TripLog> {
        self.logs.iter().find(|l| {
            l.vehicle_id == vehicle_id && l.is_ongoing() && l.project_id == self.project
        })
    }

    /// Look a vehicle up by numeric id or plate within the active site.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VehicleNotFound`] if nothing matches.
    pub fn resolve_vehicle(&self, key: &str) -> Result<&Vehicle> {
        let key = key.trim();
        let in_scope = |v: &&Vehicle| v.project_id == self.project;

        if let Ok(id) = key.parse::<i64>() {
            if let Some(vehicle) = self.vehicles.iter().filter(in_scope).find(|v| v.id == id) {
                return Ok(vehicle);
            }
        }

        self.vehicles
            .iter()
            .filter(in_scope)
            .find(|v| v.plate == key)
            .ok_or_else(|| Error::vehicle_not_found(key))
    }

    fn scoped_vehicle(&self, vehicle_id: i64) -> Result<&Vehicle> {
        self.vehicles
            .iter()
            .find(|v| v.id == vehicle_id && v.project_id == self.project)
            .ok_or_else(|| Error::vehicle_not_found(vehicle_id.to_string()))
    }

    /// Queue the remote history rows without waiting for them.
    fn record_history(&mut self, driver: &str, purpose: &str) {
        self.history_writes.retain(|write| !write.is_finished());

        let repo = Arc::clone(&self.repo);
        let rows = [
            (HistoryKind::Driver, driver.to_string()),
            (HistoryKind::Purpose, purpose.to_string()),
        ];
        self.history_writes.push(tokio::spawn(async move {
            for (kind, value) in rows {
                if let Err(e) = repo.insert_history(kind, &value).await {
                    warn!("Failed to record {} history: {}", kind, e);
                }
            }
        }));
    }

    fn mirror_state(&mut self) {
        if let Some(cache) = &mut self.cache {
            cache.save_state(&self.vehicles, &self.logs);
        }
    }

    fn mirror_history(&mut self) {
        if let Some(cache) = &mut self.cache {
            cache.save_history(&self.drivers, &self.purposes);
        }
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(Error::missing_field(field))
    } else {
        Ok(value)
    }
}

fn upsert_vehicle(vehicles: &mut Vec<Vehicle>, vehicle: Vehicle) {
    match vehicles.iter_mut().find(|v| v.id == vehicle.id) {
        Some(slot) => *slot = vehicle,
        None => vehicles.push(vehicle),
    }
}

fn upsert_log(logs: &mut Vec<TripLog>, log: TripLog) {
    match logs.iter_mut().find(|l| l.id == log.id) {
        Some(slot) => *slot = log,
        None => logs.insert(0, log),
    }
}
