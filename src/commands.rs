//! Command execution.

use crate::config::ConfigError;
use crate::{
    Commands, DriverCommand, ExpenseCommand, MaintenanceCommand, TripCommand, VehicleCommand,
};
use fleetflow_core::{
    Clock, CoreError, FleetEngine, MaintenanceStatus, NewDriver, NewExpense, NewService, NewTrip,
    NewVehicle,
};
use fleetflow_storage::{Storage, StorageError};
use serde::Serialize;
use serde_json::json;

/// Failure of a single CLI invocation.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("{0}")]
    Output(#[from] serde_json::Error),
}

impl CommandError {
    /// Short code printed next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Config(_) => "CONFIG",
            CommandError::Storage(StorageError::Core(e)) => e.error_code(),
            CommandError::Storage(_) => "STORAGE",
            CommandError::Core(e) => e.error_code(),
            CommandError::Output(_) => "OUTPUT",
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CommandError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Executes a command and returns the JSON to print.
pub fn execute(engine: &FleetEngine<Storage>, cmd: Commands) -> Result<String, CommandError> {
    match cmd {
        Commands::Vehicle(cmd) => vehicle(engine, cmd),
        Commands::Driver(cmd) => driver(engine, cmd),
        Commands::Trip(cmd) => trip(engine, cmd),
        Commands::Maintenance(cmd) => maintenance(engine, cmd),
        Commands::Expense(cmd) => expense(engine, cmd),

        Commands::Compact => {
            let result = engine.store().compact()?;
            to_json(&json!({
                "snapshot_sequence": result.snapshot.sequence,
                "records": result.snapshot.record_count,
                "snapshot_bytes": result.snapshot.size_bytes,
                "checksum": result.snapshot.checksum,
                "bytes_reclaimed": result.bytes_reclaimed,
            }))
        }
    }
}

fn vehicle(engine: &FleetEngine<Storage>, cmd: VehicleCommand) -> Result<String, CommandError> {
    match cmd {
        VehicleCommand::Add {
            name,
            model,
            plate,
            vehicle_type,
            capacity,
            odometer,
            region,
            cost,
        } => {
            let vehicle = engine.register_vehicle(NewVehicle {
                name,
                model,
                license_plate: plate,
                vehicle_type,
                max_capacity: capacity,
                odometer,
                region,
                acquisition_cost: cost,
            })?;
            to_json(&vehicle)
        }

        VehicleCommand::List { status } => {
            let vehicles: Vec<_> = engine
                .vehicles()?
                .into_iter()
                .filter(|v| status.map_or(true, |s| v.status == s))
                .collect();
            to_json(&vehicles)
        }

        VehicleCommand::Retire { id } => to_json(&engine.retire_vehicle(&id)?),
        VehicleCommand::Reactivate { id } => to_json(&engine.reactivate_vehicle(&id)?),
        VehicleCommand::Remove { id } => to_json(&engine.remove_vehicle(&id)?),
    }
}

fn driver(engine: &FleetEngine<Storage>, cmd: DriverCommand) -> Result<String, CommandError> {
    match cmd {
        DriverCommand::Add {
            name,
            phone,
            categories,
            license_expiry,
            safety_score,
        } => {
            let driver = engine.register_driver(NewDriver {
                name,
                phone,
                license_categories: categories.into_iter().collect(),
                license_expiry,
                safety_score,
            })?;
            to_json(&driver)
        }

        DriverCommand::List { status } => {
            let drivers: Vec<_> = engine
                .drivers()?
                .into_iter()
                .filter(|d| status.map_or(true, |s| d.status == s))
                .collect();
            to_json(&drivers)
        }

        DriverCommand::Status { id, status } => to_json(&engine.set_driver_status(&id, status)?),
        DriverCommand::Remove { id } => to_json(&engine.remove_driver(&id)?),
        DriverCommand::Expiring { days } => to_json(&engine.expiring_licenses(days)?),
    }
}

fn trip(engine: &FleetEngine<Storage>, cmd: TripCommand) -> Result<String, CommandError> {
    match cmd {
        TripCommand::Create {
            vehicle,
            driver,
            from,
            to,
            weight,
            revenue,
        } => {
            let trip = engine.create_trip(NewTrip {
                vehicle_id: vehicle,
                driver_id: driver,
                origin: from,
                destination: to,
                cargo_weight: weight,
                revenue,
            })?;
            to_json(&trip)
        }

        TripCommand::Dispatch { id } => to_json(&engine.dispatch(&id)?),
        TripCommand::Complete { id, odometer } => to_json(&engine.complete(&id, odometer)?),
        TripCommand::Cancel { id } => to_json(&engine.cancel(&id)?),

        TripCommand::List { status, vehicle } => {
            let trips: Vec<_> = engine
                .trips()?
                .into_iter()
                .filter(|t| status.map_or(true, |s| t.status == s))
                .filter(|t| vehicle.as_ref().map_or(true, |v| &t.vehicle_id == v))
                .collect();
            to_json(&trips)
        }
    }
}

fn maintenance(
    engine: &FleetEngine<Storage>,
    cmd: MaintenanceCommand,
) -> Result<String, CommandError> {
    match cmd {
        MaintenanceCommand::Log {
            vehicle,
            service,
            description,
            cost,
            date,
            next_due,
        } => {
            let record = engine.log_service(NewService {
                vehicle_id: vehicle,
                service_type: service,
                description,
                cost,
                service_date: date.unwrap_or_else(|| engine.clock().today()),
                next_due_date: next_due,
            })?;
            to_json(&record)
        }

        MaintenanceCommand::Complete { id } => to_json(&engine.complete_service(&id)?),

        MaintenanceCommand::List { vehicle, open } => {
            let records: Vec<_> = engine
                .maintenance_records()?
                .into_iter()
                .filter(|m| !open || m.status == MaintenanceStatus::InProgress)
                .filter(|m| vehicle.as_ref().map_or(true, |v| &m.vehicle_id == v))
                .collect();
            to_json(&records)
        }
    }
}

fn expense(engine: &FleetEngine<Storage>, cmd: ExpenseCommand) -> Result<String, CommandError> {
    match cmd {
        ExpenseCommand::Add {
            vehicle,
            trip,
            expense_type,
            liters,
            cost,
            date,
        } => {
            let expense = engine.record_expense(NewExpense {
                vehicle_id: vehicle,
                trip_id: trip,
                expense_type,
                liters,
                cost,
                date: date.unwrap_or_else(|| engine.clock().today()),
            })?;
            to_json(&expense)
        }

        ExpenseCommand::Delete { id } => to_json(&engine.delete_expense(&id)?),

        ExpenseCommand::List { vehicle } => match vehicle {
            Some(id) => to_json(&engine.expenses_for(&id)?),
            None => to_json(&engine.expenses()?),
        },
    }
}
