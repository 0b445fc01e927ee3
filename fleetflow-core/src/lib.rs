//! # fleetflow-core
//!
//! Fleet lifecycle engine for fleetflow.
//!
//! This crate provides:
//! - Vehicle, driver, trip, maintenance and expense records
//! - Allocation checks (cargo capacity, driver license)
//! - Trip and maintenance state machines with atomic side effects
//! - Fleet registry and expense bookkeeping
//! - The entity store contract and an in-memory store

pub mod allocation;
pub mod clock;
pub mod engine;
pub mod error;
pub mod expense;
pub mod maintenance;
pub mod record;
pub mod registry;
pub mod store;
pub mod trip;

pub use allocation::{check_allocation, fits_capacity, license_expires_within, license_valid};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::FleetEngine;
pub use error::{CoreError, LicenseProblem};
pub use expense::NewExpense;
pub use maintenance::NewService;
pub use record::{
    Driver, DriverStatus, Entity, EntityKind, Expense, ExpenseType, Maintenance,
    MaintenanceStatus, Record, Region, Trip, TripStatus, Vehicle, VehicleStatus, VehicleType,
};
pub use registry::{NewDriver, NewVehicle, DEFAULT_SAFETY_SCORE, LICENSE_WARNING_DAYS};
pub use store::{Change, ChangeSet, EntityStore, MemoryStore, RecordMap};
pub use trip::{NewTrip, TripAction};
