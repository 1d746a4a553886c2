//! Command-line interface for motorpool.
//!
//! This module provides the CLI structure for the `motorpool` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CheckinCommand, CheckoutCommand, ConfigCommand, ExportCommand, FilterArgs, HistoryCommand,
    LogCommand, LogsCommand, MemoCommand, OutputFormat, ProjectArg, StatsCommand, StatusCommand,
    VehicleCommand, VehiclesCommand, WatchCommand,
};

/// motorpool - Check vehicles out and back in
///
/// Tracks who has which fleet vehicle, where parked vehicles are, and the
/// trip history of each site.
#[derive(Debug, Parser)]
#[command(name = "motorpool")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Site to work in (defaults to the configured site)
    #[arg(long, global = true, value_enum)]
    pub project: Option<ProjectArg>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the dashboard: fleet summary, vehicles, and latest trips
    Status(StatusCommand),

    /// List vehicles in the current site
    Vehicles(VehiclesCommand),

    /// Take a vehicle out
    Checkout(CheckoutCommand),

    /// Return a vehicle
    Checkin(CheckinCommand),

    /// Set or clear a vehicle note
    Memo(MemoCommand),

    /// Manage vehicles
    #[command(subcommand)]
    Vehicle(VehicleCommand),

    /// Manage trip logs
    #[command(subcommand)]
    Log(LogCommand),

    /// Search trip logs
    Logs(LogsCommand),

    /// Monthly statistics
    Stats(StatsCommand),

    /// Export trip logs to CSV
    Export(ExportCommand),

    /// Show recently used drivers and purposes
    History(HistoryCommand),

    /// Insert the built-in fleet into an empty store
    Seed,

    /// Follow fleet changes until interrupted
    Watch(WatchCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "motorpool");
    }

    #[test]
    fn test_cli_verify() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(
            parse(&["motorpool", "-q", "status"]).verbosity(),
            crate::logging::Verbosity::Quiet
        );
        assert_eq!(
            parse(&["motorpool", "status"]).verbosity(),
            crate::logging::Verbosity::Normal
        );
        assert_eq!(
            parse(&["motorpool", "-v", "status"]).verbosity(),
            crate::logging::Verbosity::Verbose
        );
        assert_eq!(
            parse(&["motorpool", "-vv", "status"]).verbosity(),
            crate::logging::Verbosity::Trace
        );
    }

    #[test]
    fn test_parse_checkout() {
        let cli = parse(&[
            "motorpool", "checkout", "170허8466", "--driver", "Kim", "--purpose", "Meeting",
        ]);
        match cli.command {
            Command::Checkout(cmd) => {
                assert_eq!(cmd.vehicle, "170허8466");
                assert_eq!(cmd.driver.as_deref(), Some("Kim"));
                assert_eq!(cmd.purpose.as_deref(), Some("Meeting"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_checkout_requires_driver_and_purpose() {
        assert!(Cli::try_parse_from(["motorpool", "checkout", "5"]).is_err());
        assert!(Cli::try_parse_from(["motorpool", "checkout", "5", "-d", "Kim"]).is_err());
        assert!(Cli::try_parse_from(["motorpool", "checkout", "5", "-p", "Meeting"]).is_err());
    }

    #[test]
    fn test_parse_checkout_reuse_last() {
        let cli = parse(&["motorpool", "checkout", "5", "--reuse-last", "-p", "Bank"]);
        match cli.command {
            Command::Checkout(cmd) => {
                assert!(cmd.reuse_last);
                assert!(cmd.driver.is_none());
                assert_eq!(cmd.purpose.as_deref(), Some("Bank"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_checkin_without_location() {
        let cli = parse(&["motorpool", "checkin", "5"]);
        assert!(matches!(
            cli.command,
            Command::Checkin(CheckinCommand { location: None, .. })
        ));
    }

    #[test]
    fn test_parse_global_project() {
        let cli = parse(&["motorpool", "vehicles", "--project", "pure"]);
        assert_eq!(cli.project, Some(ProjectArg::Pure));
    }

    #[test]
    fn test_parse_logs_filters() {
        let cli = parse(&[
            "motorpool", "logs", "--from", "2024-02-01", "--search", "kim", "--all", "-f", "csv",
        ]);
        match cli.command {
            Command::Logs(cmd) => {
                assert!(cmd.all);
                assert_eq!(cmd.format, OutputFormat::Csv);
                assert_eq!(cmd.filter.search.as_deref(), Some("kim"));
                assert_eq!(
                    cmd.filter.from,
                    chrono::NaiveDate::from_ymd_opt(2024, 2, 1)
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        assert!(Cli::try_parse_from(["motorpool", "logs", "--from", "02/01/2024"]).is_err());
    }

    #[test]
    fn test_parse_stats_month() {
        let cli = parse(&["motorpool", "stats", "--month", "2024-03"]);
        match cli.command {
            Command::Stats(cmd) => {
                assert_eq!(cmd.month.map(|m| m.to_string()).as_deref(), Some("2024-03"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_vehicle_add() {
        let cli = parse(&["motorpool", "vehicle", "add", "99가9999", "아반떼"]);
        assert!(matches!(
            cli.command,
            Command::Vehicle(VehicleCommand::Add { location: None, .. })
        ));
    }

    #[test]
    fn test_parse_log_delete() {
        let cli = parse(&["motorpool", "log", "delete", "12"]);
        assert!(matches!(
            cli.command,
            Command::Log(LogCommand::Delete { id: 12 })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["motorpool", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_memo_clear() {
        let cli = parse(&["motorpool", "memo", "5"]);
        assert!(matches!(
            cli.command,
            Command::Memo(MemoCommand { text: None, .. })
        ));
    }
}
