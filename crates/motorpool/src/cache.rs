//! Local JSON mirror of the ledger.
//!
//! Two independent slots live in one directory: the vehicle/log state and
//! the recency lists. Slots are read once at startup and rewritten after
//! every change. Any read or write problem is logged and otherwise ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::history::RecentList;
use crate::model::{TripLog, Vehicle};

/// File holding vehicles and logs.
pub const STATE_FILE: &str = "vehicle-app-state-v1.json";

/// File holding the driver and purpose lists.
pub const HISTORY_FILE: &str = "vehicle-app-history-v1.json";

/// Cached vehicles and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Vehicles in ledger order.
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    /// Logs, newest first.
    #[serde(default)]
    pub logs: Vec<TripLog>,
}

/// Cached recency lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Recent drivers.
    #[serde(default)]
    pub driver_history: RecentList,
    /// Recent purposes.
    #[serde(default)]
    pub purpose_history: RecentList,
}

#[derive(Serialize)]
struct StateRef<'a> {
    vehicles: &'a [Vehicle],
    logs: &'a [TripLog],
}

#[derive(Serialize)]
struct HistoryRef<'a> {
    driver_history: &'a RecentList,
    purpose_history: &'a RecentList,
}

/// The on-disk cache directory.
#[derive(Debug)]
pub struct LocalCache {
    dir: PathBuf,
    /// BLAKE3 digest of the last bytes written per file.
    written: HashMap<&'static str, String>,
}

impl LocalCache {
    /// A cache rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: HashMap::new(),
        }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the state slot.
    #[must_use]
    pub fn load_state(&self) -> Option<StateSnapshot> {
        self.read_slot(STATE_FILE)
    }

    /// Read the history slot.
    #[must_use]
    pub fn load_history(&self) -> Option<HistorySnapshot> {
        self.read_slot(HISTORY_FILE)
    }

    /// Mirror vehicles and logs.
    pub fn save_state(&mut self, vehicles: &[Vehicle], logs: &[TripLog]) {
        self.write_slot(STATE_FILE, &StateRef { vehicles, logs });
    }

    /// Mirror the recency lists.
    pub fn save_history(&mut self, drivers: &RecentList, purposes: &RecentList) {
        self.write_slot(
            HISTORY_FILE,
            &HistoryRef {
                driver_history: drivers,
                purpose_history: purposes,
            },
        );
    }

    fn read_slot<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.dir.join(file);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("No cache at {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring malformed cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_slot<T: Serialize>(&mut self, file: &'static str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize cache slot {}: {}", file, e);
                return;
            }
        };

        let digest = blake3::hash(&bytes).to_hex().to_string();
        if self.written.get(file) == Some(&digest) {
            debug!("Cache slot {} unchanged, skipping write", file);
            return;
        }

        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("Failed to create cache dir {}: {}", self.dir.display(), e);
            return;
        }

        let path = self.dir.join(file);
        match std::fs::write(&path, &bytes) {
            Ok(()) => {
                self.written.insert(file, digest);
            }
            Err(e) => warn!("Failed to write cache file {}: {}", path.display(), e),
        }
    }
}
