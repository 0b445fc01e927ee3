//! fleetflow - fleet operations record keeper
//!
//! Tracks vehicles, drivers, trips, maintenance and expenses in a journaled
//! on-disk store. Each subcommand runs one operation and prints the affected
//! records as JSON.

mod commands;
mod config;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use fleetflow_core::{DriverStatus, ExpenseType, Region, TripStatus, VehicleStatus, VehicleType};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetflow")]
#[command(about = "Fleet operations record keeper: vehicles, drivers, trips, maintenance, expenses")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "FLEETFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage vehicles
    #[command(subcommand)]
    Vehicle(VehicleCommand),

    /// Manage drivers
    #[command(subcommand)]
    Driver(DriverCommand),

    /// Create and move trips through their lifecycle
    #[command(subcommand)]
    Trip(TripCommand),

    /// Log and complete vehicle maintenance
    #[command(subcommand)]
    Maintenance(MaintenanceCommand),

    /// Record and delete expenses
    #[command(subcommand)]
    Expense(ExpenseCommand),

    /// Snapshot all records and truncate the journal
    Compact,
}

#[derive(Subcommand)]
pub enum VehicleCommand {
    /// Register a vehicle
    Add {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        model: String,

        /// License plate (must be unique)
        #[arg(long)]
        plate: String,

        /// Truck, Van or Bike
        #[arg(long = "type")]
        vehicle_type: VehicleType,

        /// Maximum cargo weight in kg
        #[arg(long)]
        capacity: f64,

        /// Odometer reading in km
        #[arg(long, default_value = "0")]
        odometer: f64,

        /// North, South, East or West
        #[arg(long, default_value = "North")]
        region: Region,

        /// Acquisition cost
        #[arg(long)]
        cost: Option<f64>,
    },

    /// List vehicles
    List {
        #[arg(long)]
        status: Option<VehicleStatus>,
    },

    /// Take a vehicle out of service
    Retire { id: String },

    /// Return a retired vehicle to service
    Reactivate { id: String },

    /// Delete a vehicle
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum DriverCommand {
    /// Register a driver
    Add {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        phone: String,

        /// Comma-separated vehicle types the license covers
        #[arg(long, value_delimiter = ',', required = true)]
        categories: Vec<VehicleType>,

        /// License expiry date (YYYY-MM-DD)
        #[arg(long)]
        license_expiry: NaiveDate,

        /// Safety score between 0 and 100
        #[arg(long)]
        safety_score: Option<f64>,
    },

    /// List drivers
    List {
        #[arg(long)]
        status: Option<DriverStatus>,
    },

    /// Set a driver On Duty, Off Duty or Suspended
    Status { id: String, status: DriverStatus },

    /// Delete a driver
    Remove { id: String },

    /// List drivers whose license expires soon
    Expiring {
        #[arg(long, default_value_t = fleetflow_core::LICENSE_WARNING_DAYS)]
        days: u32,
    },
}

#[derive(Subcommand)]
pub enum TripCommand {
    /// Create a Draft trip
    Create {
        #[arg(long)]
        vehicle: String,

        #[arg(long)]
        driver: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Cargo weight in kg
        #[arg(long)]
        weight: f64,

        #[arg(long)]
        revenue: Option<f64>,
    },

    /// Dispatch a Draft trip
    Dispatch { id: String },

    /// Complete a Dispatched trip
    Complete {
        id: String,

        /// Odometer reading at arrival
        #[arg(long)]
        odometer: f64,
    },

    /// Cancel a Draft or Dispatched trip
    Cancel { id: String },

    /// List trips
    List {
        #[arg(long)]
        status: Option<TripStatus>,

        #[arg(long)]
        vehicle: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum MaintenanceCommand {
    /// Open a service record and send the vehicle to the shop
    Log {
        #[arg(long)]
        vehicle: String,

        /// Service type, e.g. "Oil Change"
        #[arg(long)]
        service: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        cost: f64,

        /// Service date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        next_due: Option<NaiveDate>,
    },

    /// Complete an open service record
    Complete { id: String },

    /// List service records
    List {
        #[arg(long)]
        vehicle: Option<String>,

        /// Only In Progress records
        #[arg(long)]
        open: bool,
    },
}

#[derive(Subcommand)]
pub enum ExpenseCommand {
    /// Record an expense
    Add {
        #[arg(long)]
        vehicle: String,

        #[arg(long)]
        trip: Option<String>,

        /// Fuel, Toll, Maintenance or Other
        #[arg(long = "type")]
        expense_type: ExpenseType,

        /// Fuel volume (fuel expenses only)
        #[arg(long, default_value = "0")]
        liters: f64,

        #[arg(long)]
        cost: f64,

        /// Expense date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Delete an expense
    Delete { id: String },

    /// List expenses
    List {
        #[arg(long)]
        vehicle: Option<String>,
    },
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", format!("error[{}]", e.code()).red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String, commands::CommandError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }

    if let Some(path) = &cli.config {
        tracing::debug!("Loaded config from {}", path.display());
    }
    tracing::debug!("Data directory: {}", config.storage.data_dir.display());

    let storage = fleetflow_storage::Storage::open(config.storage_config())?;
    let engine = fleetflow_core::FleetEngine::with_clock(storage, config.clock());

    let result = commands::execute(&engine, cli.command);

    if let Err(e) = engine.store().close() {
        tracing::error!("Failed to sync journal on exit: {}", e);
    }
    result
}
