//! Derived figures over vehicles and trip logs.
//!
//! Everything here is a pure function of the slices passed in. Callers scope
//! the slices to the active site first.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{TripLog, Vehicle};
use crate::timestamp::MonthKey;

/// Number of drivers shown on the leaderboard.
pub const LEADERBOARD_SIZE: usize = 5;

/// Number of logs shown on the dashboard before "show all".
pub const DASHBOARD_PAGE_SIZE: usize = 10;

/// Number of months offered in the month picker.
pub const MONTH_OPTION_COUNT: usize = 12;

/// Trip count for one vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleTrips<'a> {
    /// The vehicle.
    pub vehicle: &'a Vehicle,
    /// Number of trips.
    pub trips: usize,
}

/// Trip count for one driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverTrips {
    /// Driver name, exactly as entered.
    pub driver: String,
    /// Number of trips.
    pub trips: usize,
}

/// Count trips per vehicle, most used first.
///
/// Every vehicle appears, including those with no trips. Ties keep the
/// order of `vehicles`.
#[must_use]
pub fn trip_counts_by_vehicle<'a>(vehicles: &'a [Vehicle], logs: &[TripLog]) -> Vec<VehicleTrips<'a>> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for log in logs {
        *counts.entry(log.vehicle_id).or_default() += 1;
    }

    let mut rows: Vec<VehicleTrips<'a>> = vehicles
        .iter()
        .map(|vehicle| VehicleTrips {
            vehicle,
            trips: counts.get(&vehicle.id).copied().unwrap_or(0),
        })
        .collect();
    // sort_by is stable
    rows.sort_by(|a, b| b.trips.cmp(&a.trips));
    rows
}

/// Every driver with their trip count, most active first.
///
/// Drivers are grouped by exact name. Ties keep first-seen order.
#[must_use]
pub fn driver_ranking(logs: &[TripLog]) -> Vec<DriverTrips> {
    let mut rows: Vec<DriverTrips> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for log in logs {
        match index.get(log.driver.as_str()) {
            Some(&i) => rows[i].trips += 1,
            None => {
                index.insert(log.driver.as_str(), rows.len());
                rows.push(DriverTrips {
                    driver: log.driver.clone(),
                    trips: 1,
                });
            }
        }
    }

    rows.sort_by(|a, b| b.trips.cmp(&a.trips));
    rows
}

/// The top [`LEADERBOARD_SIZE`] drivers.
#[must_use]
pub fn driver_leaderboard(logs: &[TripLog]) -> Vec<DriverTrips> {
    let mut ranking = driver_ranking(logs);
    ranking.truncate(LEADERBOARD_SIZE);
    ranking
}

/// Criteria for narrowing the log list. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Case-insensitive substring of plate, driver, purpose, or model.
    pub term: Option<String>,
    /// Earliest departure date, inclusive.
    pub date_from: Option<NaiveDate>,
    /// Latest departure date, inclusive.
    pub date_to: Option<NaiveDate>,
    /// Exact vehicle.
    pub vehicle_id: Option<i64>,
    /// Exact driver name.
    pub driver: Option<String>,
}

impl LogFilter {
    /// Whether any criterion other than the search term is set.
    #[must_use]
    pub fn has_active_filters(&self) -> bool {
        self.date_from.is_some()
            || self.date_to.is_some()
            || self.vehicle_id.is_some()
            || self.driver.as_deref().is_some_and(|d| !d.is_empty())
    }

    /// Whether `log` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, log: &TripLog) -> bool {
        if let Some(term) = self.term.as_deref().filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            let hit = [&log.plate, &log.driver, &log.purpose, &log.model]
                .iter()
                .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }

        let date = log.out_time.date();
        if self.date_from.is_some_and(|from| date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| date > to) {
            return false;
        }

        if self.vehicle_id.is_some_and(|id| log.vehicle_id != id) {
            return false;
        }

        if let Some(driver) = self.driver.as_deref().filter(|d| !d.is_empty()) {
            if log.driver != driver {
                return false;
            }
        }

        true
    }

    /// The matching logs, in input order.
    #[must_use]
    pub fn apply<'a>(&self, logs: &'a [TripLog]) -> Vec<&'a TripLog> {
        logs.iter().filter(|log| self.matches(log)).collect()
    }
}

/// Figures for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyStats<'a> {
    /// The month.
    #[serde(serialize_with = "serialize_display")]
    pub month: MonthKey,
    /// Trips that departed in the month.
    pub total_trips: usize,
    /// Per-vehicle counts within the month.
    pub vehicles: Vec<VehicleTrips<'a>>,
    /// Full driver ranking within the month.
    pub drivers: Vec<DriverTrips>,
}

/// Figures for the trips that departed in `month`.
#[must_use]
pub fn monthly_stats<'a>(month: MonthKey, vehicles: &'a [Vehicle], logs: &[TripLog]) -> MonthlyStats<'a> {
    let in_month: Vec<TripLog> = logs
        .iter()
        .filter(|log| month.contains(log.out_time.date()))
        .cloned()
        .collect();

    MonthlyStats {
        month,
        total_trips: in_month.len(),
        vehicles: trip_counts_by_vehicle(vehicles, &in_month),
        drivers: driver_ranking(&in_month),
    }
}

/// Vehicle counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    /// All vehicles.
    pub total: usize,
    /// Parked vehicles.
    pub available: usize,
    /// Vehicles out on a trip.
    pub in_use: usize,
}

/// Count vehicles by state.
#[must_use]
pub fn fleet_summary(vehicles: &[Vehicle]) -> FleetSummary {
    let available = vehicles.iter().filter(|v| v.is_available()).count();
    FleetSummary {
        total: vehicles.len(),
        available,
        in_use: vehicles.len() - available,
    }
}

/// Distinct driver names, sorted.
#[must_use]
pub fn unique_drivers(logs: &[TripLog]) -> Vec<String> {
    let mut drivers: Vec<String> = logs.iter().map(|l| l.driver.clone()).collect();
    drivers.sort();
    drivers.dedup();
    drivers
}

/// An entry in the month picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthOption {
    /// `YYYY-MM`.
    pub value: String,
    /// `YYYY년 M월`.
    pub label: String,
}

/// The [`MONTH_OPTION_COUNT`] months ending at `current`, newest first.
#[must_use]
pub fn month_options(current: MonthKey) -> Vec<MonthOption> {
    current
        .recent(MONTH_OPTION_COUNT)
        .into_iter()
        .map(|month| MonthOption {
            value: month.to_string(),
            label: month.label(),
        })
        .collect()
}

/// The slice of `items` shown on the dashboard.
#[must_use]
pub fn dashboard_page<T>(items: &[T], show_all: bool) -> &[T] {
    if show_all {
        items
    } else {
        &items[..items.len().min(DASHBOARD_PAGE_SIZE)]
    }
}

fn serialize_display<S: serde::Serializer>(
    value: &MonthKey,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
