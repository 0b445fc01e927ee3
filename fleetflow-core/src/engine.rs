//! Fleet engine - the single writer that applies lifecycle transitions.
//!
//! Every mutating operation takes the engine's write lock, reads the records
//! it needs, validates, builds one [`ChangeSet`] and commits it. Operations
//! are therefore serialized, and a failed validation never reaches the
//! store. The operations themselves live in `trip`, `maintenance`,
//! `registry` and `expense`.

use crate::clock::{Clock, SystemClock};
use crate::error::CoreError;
use crate::record::{Driver, Entity, Expense, Maintenance, Trip, Vehicle, VehicleStatus};
use crate::store::{ChangeSet, EntityStore};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Coordinates vehicles, drivers, trips, maintenance and expenses on top of
/// an [`EntityStore`].
pub struct FleetEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl<S: EntityStore> FleetEngine<S> {
    /// Creates an engine using the system clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Creates an engine with an injected clock.
    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the engine's clock.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn vehicle(&self, id: &str) -> Result<Vehicle, CoreError> {
        self.store.fetch(id)
    }

    pub fn driver(&self, id: &str) -> Result<Driver, CoreError> {
        self.store.fetch(id)
    }

    pub fn trip(&self, id: &str) -> Result<Trip, CoreError> {
        self.store.fetch(id)
    }

    pub fn maintenance(&self, id: &str) -> Result<Maintenance, CoreError> {
        self.store.fetch(id)
    }

    pub fn expense(&self, id: &str) -> Result<Expense, CoreError> {
        self.store.fetch(id)
    }

    pub fn vehicles(&self) -> Result<Vec<Vehicle>, CoreError> {
        self.store.list_of()
    }

    pub fn drivers(&self) -> Result<Vec<Driver>, CoreError> {
        self.store.list_of()
    }

    pub fn trips(&self) -> Result<Vec<Trip>, CoreError> {
        self.store.list_of()
    }

    pub fn maintenance_records(&self) -> Result<Vec<Maintenance>, CoreError> {
        self.store.list_of()
    }

    pub fn expenses(&self) -> Result<Vec<Expense>, CoreError> {
        self.store.list_of()
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Serializes writers for the duration of a read-validate-commit cycle.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    /// Commits a transition's change set.
    pub(crate) fn commit(&self, changes: ChangeSet) -> Result<(), CoreError> {
        self.store.commit(changes)
    }

    /// Fetches a record while the write lock is held.
    pub(crate) fn load<T: Entity>(&self, id: &str) -> Result<T, CoreError> {
        self.store.fetch(id)
    }

    /// Like [`load`](Self::load), but a removed record is `None`.
    pub(crate) fn load_if_present<T: Entity>(&self, id: &str) -> Result<Option<T>, CoreError> {
        match self.store.fetch(id) {
            Ok(record) => Ok(Some(record)),
            Err(CoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The status a vehicle settles into when the trip or service `closing`
    /// lets go of it.
    ///
    /// Open maintenance keeps it In Shop, a Dispatched trip keeps it On Trip,
    /// and a Retired vehicle stays Retired.
    pub(crate) fn settled_status(
        &self,
        vehicle: &Vehicle,
        closing: &str,
    ) -> Result<VehicleStatus, CoreError> {
        if vehicle.status == VehicleStatus::Retired {
            return Ok(VehicleStatus::Retired);
        }
        if self
            .open_services_for(&vehicle.id)?
            .iter()
            .any(|m| m.id != closing)
        {
            return Ok(VehicleStatus::InShop);
        }
        if self
            .active_trips_for(&vehicle.id)?
            .iter()
            .any(|t| t.id != closing)
        {
            return Ok(VehicleStatus::OnTrip);
        }
        Ok(VehicleStatus::Available)
    }
}

/// Rejects numbers that are NaN or infinite.
pub(crate) fn ensure_finite(field: &str, value: f64) -> Result<(), CoreError> {
    if !value.is_finite() {
        return Err(CoreError::validation(format!("{} must be a finite number", field)));
    }
    Ok(())
}

/// Rejects negative or non-finite numbers.
pub(crate) fn ensure_non_negative(field: &str, value: f64) -> Result<(), CoreError> {
    ensure_finite(field, value)?;
    if value < 0.0 {
        return Err(CoreError::validation(format!(
            "{} must not be negative (got {})",
            field, value
        )));
    }
    Ok(())
}

/// Rejects zero, negative or non-finite numbers.
pub(crate) fn ensure_positive(field: &str, value: f64) -> Result<(), CoreError> {
    ensure_finite(field, value)?;
    if value <= 0.0 {
        return Err(CoreError::validation(format!(
            "{} must be positive (got {})",
            field, value
        )));
    }
    Ok(())
}

/// Rejects blank strings.
pub(crate) fn ensure_present(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
