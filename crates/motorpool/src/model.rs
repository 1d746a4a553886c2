//! Core fleet records.
//!
//! Field names follow the store's column names so the same types travel
//! through the SQLite backend, the REST backend, and the local cache.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::timestamp::Timestamp;

/// Location shown for a vehicle while it is out on a trip.
pub const IN_TRANSIT_LOCATION: &str = "운행 중";

/// Default parking location for new and returned vehicles.
pub const DEFAULT_LOCATION: &str = "평택 사무실 앞";

/// The site a vehicle or trip belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Project {
    /// 그린동.
    #[default]
    Green,
    /// 초순수.
    Pure,
}

impl Project {
    /// All sites, in display order.
    pub const ALL: [Self; 2] = [Self::Green, Self::Pure];

    /// Identifier used in the store.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Pure => "pure",
        }
    }

    /// Display label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Green => "그린동",
            Self::Pure => "초순수",
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Project {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "green" => Ok(Self::Green),
            "pure" => Ok(Self::Pure),
            other => Err(Error::invalid_input("project", other)),
        }
    }
}

/// Whether a vehicle is parked or out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    /// Parked and ready for checkout.
    #[serde(rename = "available")]
    Available,
    /// Out on a trip.
    #[serde(rename = "in-use")]
    InUse,
}

impl VehicleStatus {
    /// Identifier used in the store.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::InUse => "in-use",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(Self::Available),
            "in-use" => Ok(Self::InUse),
            other => Err(Error::invalid_input("vehicle status", other)),
        }
    }
}

/// Whether a trip is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    /// Checked out, not yet returned.
    Ongoing,
    /// Returned.
    Completed,
}

impl TripStatus {
    /// Identifier used in the store.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        }
    }

    /// Display label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ongoing => "운행중",
            Self::Completed => "반납완료",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            other => Err(Error::invalid_input("trip status", other)),
        }
    }
}

/// A fleet vehicle.
///
/// `last_driver` is kept after check-in so it always names whoever used
/// the vehicle most recently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Store-assigned identifier.
    pub id: i64,
    /// License plate.
    pub plate: String,
    /// Model name.
    pub model: String,
    /// Current state.
    pub status: VehicleStatus,
    /// Most recent driver, empty if never driven.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_driver: String,
    /// Parking location, or [`IN_TRANSIT_LOCATION`] while in use.
    pub location: String,
    /// Owning site.
    pub project_id: Project,
    /// Free-text note.
    #[serde(default)]
    pub memo: Option<String>,
}

impl Vehicle {
    /// Whether the vehicle can be checked out.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == VehicleStatus::Available
    }

    /// The seven vehicles the fleet starts with before any data is loaded.
    #[must_use]
    pub fn default_fleet() -> Vec<Self> {
        [
            (1, "170허8468", "K5", Project::Pure),
            (2, "721하5723", "스타리아", Project::Pure),
            (3, "222호1406", "스타리아", Project::Pure),
            (4, "721하5724", "스타리아", Project::Pure),
            (5, "170허8466", "K5", Project::Green),
            (6, "222호1047", "스타리아", Project::Green),
            (7, "176허3747", "K3", Project::Green),
        ]
        .into_iter()
        .map(|(id, plate, model, project_id)| Self {
            id,
            plate: plate.to_string(),
            model: model.to_string(),
            status: VehicleStatus::Available,
            last_driver: String::new(),
            location: DEFAULT_LOCATION.to_string(),
            project_id,
            memo: None,
        })
        .collect()
    }
}

/// Fields for a vehicle that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVehicle {
    /// License plate.
    pub plate: String,
    /// Model name.
    pub model: String,
    /// Initial state.
    pub status: VehicleStatus,
    /// Initial driver, normally empty.
    pub last_driver: String,
    /// Parking location.
    pub location: String,
    /// Owning site.
    pub project_id: Project,
    /// Free-text note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl NewVehicle {
    /// A parked vehicle with no history.
    #[must_use]
    pub fn available(
        plate: impl Into<String>,
        model: impl Into<String>,
        location: impl Into<String>,
        project_id: Project,
    ) -> Self {
        Self {
            plate: plate.into(),
            model: model.into(),
            status: VehicleStatus::Available,
            last_driver: String::new(),
            location: location.into(),
            project_id,
            memo: None,
        }
    }

    /// Attach a store-assigned id.
    #[must_use]
    pub fn with_id(self, id: i64) -> Vehicle {
        Vehicle {
            id,
            plate: self.plate,
            model: self.model,
            status: self.status,
            last_driver: self.last_driver,
            location: self.location,
            project_id: self.project_id,
            memo: self.memo,
        }
    }
}

impl From<&Vehicle> for NewVehicle {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            plate: vehicle.plate.clone(),
            model: vehicle.model.clone(),
            status: vehicle.status,
            last_driver: vehicle.last_driver.clone(),
            location: vehicle.location.clone(),
            project_id: vehicle.project_id,
            memo: vehicle.memo.clone(),
        }
    }
}

/// Partial update of a vehicle row. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VehiclePatch {
    /// New state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VehicleStatus>,
    /// New last driver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_driver: Option<String>,
    /// New location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// New memo; `Some(None)` clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<Option<String>>,
}

impl VehiclePatch {
    /// Apply this patch to a vehicle in place.
    pub fn apply(&self, vehicle: &mut Vehicle) {
        if let Some(status) = self.status {
            vehicle.status = status;
        }
        if let Some(driver) = &self.last_driver {
            vehicle.last_driver.clone_from(driver);
        }
        if let Some(location) = &self.location {
            vehicle.location.clone_from(location);
        }
        if let Some(memo) = &self.memo {
            vehicle.memo.clone_from(memo);
        }
    }
}

/// A single checkout-to-checkin trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripLog {
    /// Store-assigned identifier.
    pub id: i64,
    /// The vehicle this trip used.
    pub vehicle_id: i64,
    /// Plate at checkout time.
    pub plate: String,
    /// Model at checkout time.
    pub model: String,
    /// Driver name.
    pub driver: String,
    /// Purpose or destination.
    pub purpose: String,
    /// When the vehicle left.
    pub out_time: Timestamp,
    /// When the vehicle came back.
    #[serde(default)]
    pub in_time: Option<Timestamp>,
    /// Trip state.
    pub status: TripStatus,
    /// Site inherited from the vehicle.
    pub project_id: Project,
}

impl TripLog {
    /// Whether the trip is still running.
    #[must_use]
    pub fn is_ongoing(&self) -> bool {
        self.status == TripStatus::Ongoing
    }
}

/// Fields for a trip that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTripLog {
    /// The vehicle this trip uses.
    pub vehicle_id: i64,
    /// Plate snapshot.
    pub plate: String,
    /// Model snapshot.
    pub model: String,
    /// Driver name.
    pub driver: String,
    /// Purpose or destination.
    pub purpose: String,
    /// Departure time.
    pub out_time: Timestamp,
    /// Always `None` for a new trip.
    pub in_time: Option<Timestamp>,
    /// Always [`TripStatus::Ongoing`] for a new trip.
    pub status: TripStatus,
    /// Site inherited from the vehicle.
    pub project_id: Project,
}

impl NewTripLog {
    /// Start a trip for `vehicle`.
    #[must_use]
    pub fn departing(
        vehicle: &Vehicle,
        driver: impl Into<String>,
        purpose: impl Into<String>,
        out_time: Timestamp,
    ) -> Self {
        Self {
            vehicle_id: vehicle.id,
            plate: vehicle.plate.clone(),
            model: vehicle.model.clone(),
            driver: driver.into(),
            purpose: purpose.into(),
            out_time,
            in_time: None,
            status: TripStatus::Ongoing,
            project_id: vehicle.project_id,
        }
    }

    /// Attach a store-assigned id.
    #[must_use]
    pub fn with_id(self, id: i64) -> TripLog {
        TripLog {
            id,
            vehicle_id: self.vehicle_id,
            plate: self.plate,
            model: self.model,
            driver: self.driver,
            purpose: self.purpose,
            out_time: self.out_time,
            in_time: self.in_time,
            status: self.status,
            project_id: self.project_id,
        }
    }
}

/// Partial update of a trip row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogPatch {
    /// New return time; `Some(None)` clears it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_time: Option<Option<Timestamp>>,
    /// New state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TripStatus>,
}

impl LogPatch {
    /// The patch that closes a trip.
    #[must_use]
    pub fn complete(in_time: Timestamp) -> Self {
        Self {
            in_time: Some(Some(in_time)),
            status: Some(TripStatus::Completed),
        }
    }

    /// The patch that reopens a trip.
    #[must_use]
    pub fn reopen() -> Self {
        Self {
            in_time: Some(None),
            status: Some(TripStatus::Ongoing),
        }
    }

    /// Apply this patch to a trip in place.
    pub fn apply(&self, log: &mut TripLog) {
        if let Some(in_time) = self.in_time {
            log.in_time = in_time;
        }
        if let Some(status) = self.status {
            log.status = status;
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}
