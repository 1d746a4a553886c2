//! `motorpool` - CLI for the fleet ledger
//!
//! This binary loads configuration, opens the configured store, hydrates a
//! [`FleetLedger`], and runs one command against it.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use chrono::Local;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use motorpool::cli::{
    CheckinCommand, CheckoutCommand, Cli, Command, ConfigCommand, ExportCommand, LogCommand,
    LogsCommand, OutputFormat, StatsCommand, StatusCommand, VehicleCommand, VehiclesCommand,
};
use motorpool::stats::{self, LogFilter};
use motorpool::timestamp::MonthKey;
use motorpool::{
    export, init_logging, repository, Change, Config, FleetLedger, LedgerPolicy, LocalCache,
    Project, TripLog, Vehicle,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    if let Command::Config(config_cmd) = cli.command {
        return handle_config(&config, config_cmd);
    }

    let project = cli
        .project
        .map_or(config.ledger.default_project, Project::from);
    let mut ledger = open_ledger(&config, project).await?;

    let outcome = match cli.command {
        Command::Status(cmd) => handle_status(&ledger, &cmd),
        Command::Vehicles(cmd) => handle_vehicles(&ledger, &cmd),
        Command::Checkout(cmd) => handle_checkout(&mut ledger, cmd).await,
        Command::Checkin(cmd) => handle_checkin(&mut ledger, &config, cmd).await,
        Command::Memo(cmd) => {
            let id = ledger.resolve_vehicle(&cmd.vehicle)?.id;
            let vehicle = ledger
                .update_memo(id, cmd.text.as_deref().unwrap_or_default())
                .await?;
            match &vehicle.memo {
                Some(memo) => println!("{}: {}", vehicle.plate, memo),
                None => println!("{}: memo cleared", vehicle.plate),
            }
            Ok(())
        }
        Command::Vehicle(cmd) => handle_vehicle(&mut ledger, &config, cmd).await,
        Command::Log(LogCommand::Delete { id }) => {
            ledger.delete_log(id).await?;
            println!("Deleted trip log {id}");
            Ok(())
        }
        Command::Logs(cmd) => handle_logs(&ledger, cmd),
        Command::Stats(cmd) => handle_stats(&ledger, &cmd),
        Command::Export(cmd) => handle_export(&ledger, cmd),
        Command::History(cmd) => {
            if cmd.json {
                let history = serde_json::json!({
                    "driver_history": ledger.driver_history(),
                    "purpose_history": ledger.purpose_history(),
                });
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                println!("Drivers:  {}", ledger.driver_history().items().join(", "));
                println!("Purposes: {}", ledger.purpose_history().items().join(", "));
            }
            Ok(())
        }
        Command::Seed => {
            let count = ledger.seed_default_fleet().await?;
            if count == 0 {
                println!("Store already has vehicles; nothing seeded.");
            } else {
                println!("Seeded {count} vehicles.");
            }
            Ok(())
        }
        Command::Watch(cmd) => watch(&mut ledger, Duration::from_secs(cmd.interval.max(1))).await,
        Command::Config(_) => Ok(()),
    };

    ledger.settle().await;
    outcome
}

async fn open_ledger(config: &Config, project: Project) -> anyhow::Result<FleetLedger> {
    let repo = repository::open(config).context("failed to open store")?;

    let mut ledger = FleetLedger::new(repo)
        .with_project(project)
        .with_policy(LedgerPolicy {
            allow_orphan_check_in: config.ledger.allow_orphan_check_in,
        });
    if config.cache.enabled {
        ledger = ledger.with_cache(LocalCache::new(config.cache_dir()));
    }

    ledger.hydrate().await;
    Ok(ledger)
}

fn handle_status(ledger: &FleetLedger, cmd: &StatusCommand) -> anyhow::Result<()> {
    let vehicles = ledger.vehicles();
    let logs = ledger.logs();
    let summary = stats::fleet_summary(&vehicles);
    let page = stats::dashboard_page(&logs, cmd.all);

    if cmd.json {
        let status = serde_json::json!({
            "project": ledger.project(),
            "summary": summary,
            "vehicles": vehicles,
            "logs": page,
            "top_drivers": stats::driver_leaderboard(&logs),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("motorpool status ({})", ledger.project().label());
    println!("------------------------");
    println!("Available:     {}", summary.available);
    println!("In use:        {}", summary.in_use);
    println!("Total:         {}", summary.total);
    println!();
    print_vehicles(&vehicles);
    println!();

    println!("Top drivers:");
    for (rank, driver) in stats::driver_leaderboard(&logs).iter().enumerate() {
        println!("  {}. {} ({})", rank + 1, driver.driver, driver.trips);
    }
    println!();

    print!("{}", export::render_table(page));
    if page.len() < logs.len() {
        println!("({} more; use --all)", logs.len() - page.len());
    }
    Ok(())
}

fn handle_vehicles(ledger: &FleetLedger, cmd: &VehiclesCommand) -> anyhow::Result<()> {
    let vehicles: Vec<Vehicle> = ledger
        .vehicles()
        .into_iter()
        .filter(|v| !cmd.available || v.is_available())
        .collect();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&vehicles)?);
    } else {
        print_vehicles(&vehicles);
    }
    Ok(())
}

async fn handle_checkout(ledger: &mut FleetLedger, cmd: CheckoutCommand) -> anyhow::Result<()> {
    let id = ledger.resolve_vehicle(&cmd.vehicle)?.id;
    let (driver, purpose) = cmd.trip_fields(ledger.driver_history(), ledger.purpose_history());

    let log = ledger.check_out(id, &driver, &purpose).await?;
    println!(
        "{} checked out to {} at {} ({})",
        log.plate, log.driver, log.out_time, log.purpose
    );
    Ok(())
}

async fn handle_checkin(
    ledger: &mut FleetLedger,
    config: &Config,
    cmd: CheckinCommand,
) -> anyhow::Result<()> {
    let vehicle = ledger.resolve_vehicle(&cmd.vehicle)?.clone();
    let location = cmd
        .location
        .unwrap_or_else(|| config.ledger.default_location.clone());

    match ledger.check_in(vehicle.id, &location).await? {
        Some(log) => println!(
            "{} returned at {} to {}",
            vehicle.plate,
            log.in_time.map(|t| t.to_string()).unwrap_or_default(),
            location
        ),
        None => println!("{} returned to {} (no open trip)", vehicle.plate, location),
    }
    Ok(())
}

async fn handle_vehicle(
    ledger: &mut FleetLedger,
    config: &Config,
    cmd: VehicleCommand,
) -> anyhow::Result<()> {
    match cmd {
        VehicleCommand::Add {
            plate,
            model,
            location,
        } => {
            let location = location.unwrap_or_else(|| config.ledger.default_location.clone());
            let vehicle = ledger.add_vehicle(&plate, &model, &location).await?;
            println!("Added {} ({}) as #{}", vehicle.plate, vehicle.model, vehicle.id);
        }
        VehicleCommand::Delete { vehicle } => {
            let vehicle = ledger.resolve_vehicle(&vehicle)?.clone();
            ledger.delete_vehicle(vehicle.id).await?;
            println!("Deleted {}", vehicle.plate);
        }
    }
    Ok(())
}

fn handle_logs(ledger: &FleetLedger, cmd: LogsCommand) -> anyhow::Result<()> {
    let logs = ledger.logs();
    let filter = LogFilter::from(cmd.filter);
    let matched = filter.apply(&logs);
    let page = stats::dashboard_page(&matched, cmd.all);

    match cmd.format {
        OutputFormat::Table => {
            print!("{}", export::render_table(page.iter().copied()));
            if page.len() < matched.len() {
                println!("({} more; use --all)", matched.len() - page.len());
            }
        }
        OutputFormat::Csv => export::write_csv(std::io::stdout().lock(), page.iter().copied())?,
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(page)?),
    }
    Ok(())
}

fn handle_stats(ledger: &FleetLedger, cmd: &StatsCommand) -> anyhow::Result<()> {
    let current = MonthKey::current();

    if cmd.months {
        for option in stats::month_options(current) {
            println!("{}  {}", option.value, option.label);
        }
        return Ok(());
    }

    let vehicles = ledger.vehicles();
    let logs = ledger.logs();
    let monthly = stats::monthly_stats(cmd.month.unwrap_or(current), &vehicles, &logs);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&monthly)?);
        return Ok(());
    }

    println!("{} ({})", monthly.month.label(), ledger.project().label());
    println!("Trips: {}", monthly.total_trips);
    println!();
    println!("By vehicle:");
    for row in &monthly.vehicles {
        println!("  {:<12} {:<10} {}", row.vehicle.plate, row.vehicle.model, row.trips);
    }
    println!();
    println!("By driver:");
    if monthly.drivers.is_empty() {
        println!("  (no trips)");
    }
    for (rank, row) in monthly.drivers.iter().enumerate() {
        println!("  {}. {} ({})", rank + 1, row.driver, row.trips);
    }
    Ok(())
}

fn handle_export(ledger: &FleetLedger, cmd: ExportCommand) -> anyhow::Result<()> {
    let logs = ledger.logs();
    let matched = LogFilter::from(cmd.filter).apply(&logs);
    let path = cmd
        .output
        .unwrap_or_else(|| PathBuf::from(export::default_file_name(Local::now().date_naive())));

    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    export::write_csv(file, matched.iter().copied())?;
    info!("Exported {} trips to {}", matched.len(), path.display());
    println!("Wrote {} rows to {}", matched.len(), path.display());
    Ok(())
}

async fn watch(ledger: &mut FleetLedger, interval: Duration) -> anyhow::Result<()> {
    let mut changes = ledger.subscribe();
    let mut ticker = tokio::time::interval(interval);
    println!(
        "Watching {} fleet via {} (Ctrl-C to stop)",
        ledger.project().label(),
        ledger.repository().name()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = changes.recv() => match received {
                Ok(change) => {
                    describe_change(&change);
                    ledger.apply_change(change);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} changes, reloading", skipped);
                    ledger.hydrate_from_remote().await;
                }
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                let before = ledger.vehicles();
                ledger.hydrate_from_remote().await;
                for vehicle in ledger.vehicles() {
                    if !before.contains(&vehicle) {
                        print_vehicle_line(&vehicle);
                    }
                }
            }
        }
    }
    Ok(())
}

fn describe_change(change: &Change) {
    match change {
        Change::VehicleInserted(v) | Change::VehicleUpdated(v) => print_vehicle_line(v),
        Change::VehicleDeleted(id) => println!("vehicle #{id} removed"),
        Change::LogInserted(log) | Change::LogUpdated(log) => print_log_line(log),
        Change::LogDeleted(id) => println!("trip #{id} removed"),
    }
}

fn print_vehicles(vehicles: &[Vehicle]) {
    println!(
        "{:<4} {:<12} {:<10} {:<10} {:<10} {}",
        "ID", "PLATE", "MODEL", "STATUS", "DRIVER", "LOCATION"
    );
    for vehicle in vehicles {
        println!(
            "{:<4} {:<12} {:<10} {:<10} {:<10} {}{}",
            vehicle.id,
            vehicle.plate,
            vehicle.model,
            vehicle.status,
            vehicle.last_driver,
            vehicle.location,
            vehicle
                .memo
                .as_deref()
                .map(|m| format!("  [{m}]"))
                .unwrap_or_default()
        );
    }
}

fn print_vehicle_line(vehicle: &Vehicle) {
    println!(
        "vehicle {} is {} at {}",
        vehicle.plate, vehicle.status, vehicle.location
    );
}

fn print_log_line(log: &TripLog) {
    println!(
        "trip #{} {} {} {} ({})",
        log.id,
        log.plate,
        log.driver,
        log.out_time,
        log.status.label()
    );
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Store]");
                println!("  Backend:            {}", config.store.backend);
                println!("  Database path:      {}", config.database_path().display());
                println!(
                    "  URL:                {}",
                    config.store.url.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "  API key:            {}",
                    if config.store.api_key.is_some() {
                        "(set)"
                    } else {
                        "(not set)"
                    }
                );
                println!("  Timeout (secs):     {}", config.store.timeout_secs);
                println!();
                println!("[Cache]");
                println!("  Enabled:            {}", config.cache.enabled);
                println!("  Directory:          {}", config.cache_dir().display());
                println!();
                println!("[Ledger]");
                println!(
                    "  Default project:    {} ({})",
                    config.ledger.default_project,
                    config.ledger.default_project.label()
                );
                println!(
                    "  Orphan check-in:    {}",
                    config.ledger.allow_orphan_check_in
                );
                println!("  Default location:   {}", config.ledger.default_location);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
