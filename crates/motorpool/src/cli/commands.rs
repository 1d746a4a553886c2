//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use crate::history::RecentList;
use crate::model::Project;
use crate::stats::LogFilter;
use crate::timestamp::{parse_date, MonthKey};

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Show every matching log instead of the latest page
    #[arg(short, long)]
    pub all: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Vehicles command arguments.
#[derive(Debug, Args)]
pub struct VehiclesCommand {
    /// Only vehicles that can be checked out
    #[arg(long)]
    pub available: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Checkout command arguments.
#[derive(Debug, Args)]
pub struct CheckoutCommand {
    /// Vehicle id or plate
    pub vehicle: String,

    /// Driver name
    #[arg(short, long, required_unless_present = "reuse_last")]
    pub driver: Option<String>,

    /// Purpose or destination
    #[arg(short, long, required_unless_present = "reuse_last")]
    pub purpose: Option<String>,

    /// Fill an omitted driver or purpose from the most recent entry
    #[arg(long)]
    pub reuse_last: bool,
}

impl CheckoutCommand {
    /// Driver and purpose to record. Omitted values stay empty unless
    /// `--reuse-last` was given, so the ledger rejects them.
    #[must_use]
    pub fn trip_fields(&self, drivers: &RecentList, purposes: &RecentList) -> (String, String) {
        let pick = |given: &Option<String>, recent: &RecentList| {
            given
                .clone()
                .or_else(|| {
                    self.reuse_last
                        .then(|| recent.latest().map(str::to_string))
                        .flatten()
                })
                .unwrap_or_default()
        };
        (pick(&self.driver, drivers), pick(&self.purpose, purposes))
    }
}

/// Checkin command arguments.
#[derive(Debug, Args)]
pub struct CheckinCommand {
    /// Vehicle id or plate
    pub vehicle: String,

    /// Where the vehicle is parked (defaults to the configured location)
    #[arg(short, long)]
    pub location: Option<String>,
}

/// Memo command arguments.
#[derive(Debug, Args)]
pub struct MemoCommand {
    /// Vehicle id or plate
    pub vehicle: String,

    /// Note text; omit to clear the note
    pub text: Option<String>,
}

/// Vehicle management commands.
#[derive(Debug, Subcommand)]
pub enum VehicleCommand {
    /// Register a vehicle in the current site
    Add {
        /// License plate
        plate: String,

        /// Model name
        model: String,

        /// Parking location (defaults to the configured location)
        #[arg(short, long)]
        location: Option<String>,
    },

    /// Remove a vehicle (its trip logs are kept)
    Delete {
        /// Vehicle id or plate
        vehicle: String,
    },
}

/// Trip log management commands.
#[derive(Debug, Subcommand)]
pub enum LogCommand {
    /// Remove a trip log
    Delete {
        /// Log id
        id: i64,
    },
}

/// Log filter arguments shared by `logs` and `export`.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Search plate, driver, purpose, and model (case-insensitive)
    #[arg(short, long)]
    pub search: Option<String>,

    /// Earliest departure date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,

    /// Latest departure date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,

    /// Only trips of this vehicle id
    #[arg(long)]
    pub vehicle: Option<i64>,

    /// Only trips of this driver (exact name)
    #[arg(long)]
    pub driver: Option<String>,
}

impl From<FilterArgs> for LogFilter {
    fn from(args: FilterArgs) -> Self {
        Self {
            term: args.search,
            date_from: args.from,
            date_to: args.to,
            vehicle_id: args.vehicle,
            driver: args.driver,
        }
    }
}

/// Logs command arguments.
#[derive(Debug, Args)]
pub struct LogsCommand {
    /// Filters
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Show every matching log instead of the latest page
    #[arg(short, long)]
    pub all: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Month to report (YYYY-MM, defaults to the current month)
    #[arg(short, long)]
    pub month: Option<MonthKey>,

    /// List the selectable months instead
    #[arg(long)]
    pub months: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Filters
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output file (defaults to 운행기록_<today>.csv)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Seconds between store refreshes
    #[arg(short, long, default_value = "10")]
    pub interval: u64,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Site argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProjectArg {
    /// 그린동
    Green,
    /// 초순수
    Pure,
}

impl From<ProjectArg> for Project {
    fn from(arg: ProjectArg) -> Self {
        match arg {
            ProjectArg::Green => Self::Green,
            ProjectArg::Pure => Self::Pure,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Formatted table
    #[default]
    Table,
    /// CSV, as exported
    Csv,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_arg_conversion() {
        assert_eq!(Project::from(ProjectArg::Green), Project::Green);
        assert_eq!(Project::from(ProjectArg::Pure), Project::Pure);
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn test_filter_args_into_log_filter() {
        let args = FilterArgs {
            search: Some("kim".to_string()),
            from: NaiveDate::from_ymd_opt(2024, 2, 1),
            to: None,
            vehicle: Some(3),
            driver: None,
        };
        let filter = LogFilter::from(args);
        assert_eq!(filter.term.as_deref(), Some("kim"));
        assert_eq!(filter.date_from, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(filter.vehicle_id, Some(3));
        assert!(filter.has_active_filters());
    }

    #[test]
    fn test_default_filter_args_match_all() {
        let filter = LogFilter::from(FilterArgs::default());
        assert_eq!(filter, LogFilter::default());
    }

    fn checkout(driver: Option<&str>, purpose: Option<&str>, reuse_last: bool) -> CheckoutCommand {
        CheckoutCommand {
            vehicle: "5".to_string(),
            driver: driver.map(str::to_string),
            purpose: purpose.map(str::to_string),
            reuse_last,
        }
    }

    #[test]
    fn test_trip_fields_do_not_reuse_history_by_default() {
        let drivers = RecentList::from(vec!["Kim".to_string()]);
        let purposes = RecentList::from(vec!["Meeting".to_string()]);

        let (driver, purpose) = checkout(None, None, false).trip_fields(&drivers, &purposes);
        assert_eq!(driver, "");
        assert_eq!(purpose, "");
    }

    #[test]
    fn test_trip_fields_reuse_last_fills_gaps_only() {
        let drivers = RecentList::from(vec!["Kim".to_string()]);
        let purposes = RecentList::from(vec!["Meeting".to_string()]);

        let (driver, purpose) =
            checkout(Some("Lee"), None, true).trip_fields(&drivers, &purposes);
        assert_eq!(driver, "Lee");
        assert_eq!(purpose, "Meeting");
    }

    #[test]
    fn test_vehicle_command_debug() {
        let cmd = VehicleCommand::Delete {
            vehicle: "170허8468".to_string(),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Delete"));
    }
}
