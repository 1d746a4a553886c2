//! `motorpool` - Fleet vehicle check-out/check-in ledger
//!
//! This library tracks who has which vehicle, where parked vehicles are, and
//! the trip log of each site. State lives behind a [`Repository`] (SQLite,
//! PostgREST, or in memory) and is mirrored by [`FleetLedger`], which applies
//! the check-out and check-in transitions and keeps the local cache current.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod repository;
pub mod stats;
pub mod storage;
pub mod timestamp;

pub use cache::LocalCache;
pub use config::Config;
pub use error::{Error, Result};
pub use history::RecentList;
pub use ledger::{FleetLedger, LedgerPolicy};
pub use logging::init_logging;
pub use model::{Project, TripLog, TripStatus, Vehicle, VehicleStatus};
pub use repository::{Change, Repository};
pub use storage::SqliteStore;
pub use timestamp::Timestamp;
