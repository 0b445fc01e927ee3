//! Trip lifecycle: Draft -> Dispatched -> Completed, with Cancelled reachable
//! from Draft and Dispatched.
//!
//! Each transition reads the trip and the vehicle/driver it references,
//! validates, and commits every affected record in a single change set.

use crate::allocation::{check_allocation, ensure_driver_on_duty, ensure_vehicle_available};
use crate::engine::{ensure_finite, ensure_non_negative, ensure_positive, ensure_present, FleetEngine};
use crate::error::CoreError;
use crate::record::{
    new_id, Driver, DriverStatus, EntityKind, Trip, TripStatus, Vehicle, VehicleStatus,
};
use crate::store::{ChangeSet, EntityStore};
use serde::{Deserialize, Serialize};

/// An action that moves a trip between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    Dispatch,
    Complete,
    Cancel,
}

impl TripAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripAction::Dispatch => "dispatch",
            TripAction::Complete => "complete",
            TripAction::Cancel => "cancel",
        }
    }
}

impl TripStatus {
    /// Returns the state `action` leads to, or `None` if it is not allowed.
    pub fn apply(self, action: TripAction) -> Option<TripStatus> {
        match (self, action) {
            (TripStatus::Draft, TripAction::Dispatch) => Some(TripStatus::Dispatched),
            (TripStatus::Dispatched, TripAction::Complete) => Some(TripStatus::Completed),
            (TripStatus::Draft | TripStatus::Dispatched, TripAction::Cancel) => {
                Some(TripStatus::Cancelled)
            }
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }
}

/// Input for [`FleetEngine::create_trip`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrip {
    pub vehicle_id: String,
    pub driver_id: String,
    pub origin: String,
    pub destination: String,
    pub cargo_weight: f64,
    #[serde(default)]
    pub revenue: Option<f64>,
}

impl NewTrip {
    fn validate(&self) -> Result<(), CoreError> {
        ensure_present("origin", &self.origin)?;
        ensure_present("destination", &self.destination)?;
        ensure_positive("cargo weight", self.cargo_weight)?;
        if let Some(revenue) = self.revenue {
            ensure_non_negative("revenue", revenue)?;
        }
        Ok(())
    }
}

fn transition(trip: &Trip, action: TripAction) -> Result<TripStatus, CoreError> {
    trip.status
        .apply(action)
        .ok_or_else(|| CoreError::InvalidTransition {
            kind: EntityKind::Trip,
            id: trip.id.clone(),
            state: trip.status.to_string(),
            action: action.as_str(),
        })
}

impl<S: EntityStore> FleetEngine<S> {
    /// Creates a Draft trip after running the allocation checks.
    ///
    /// The trip's start odometer is the vehicle's odometer now. Neither the
    /// vehicle nor the driver changes status until dispatch.
    pub fn create_trip(&self, new: NewTrip) -> Result<Trip, CoreError> {
        new.validate()?;

        let _guard = self.lock();

        let vehicle: Vehicle = self.load(&new.vehicle_id)?;
        ensure_vehicle_available(&vehicle)?;
        let driver: Driver = self.load(&new.driver_id)?;
        check_allocation(&vehicle, &driver, new.cargo_weight, self.clock().today())?;

        let trip = Trip {
            id: new_id(EntityKind::Trip),
            vehicle_id: vehicle.id,
            driver_id: driver.id,
            origin: new.origin,
            destination: new.destination,
            cargo_weight: new.cargo_weight,
            revenue: new.revenue,
            start_odometer: vehicle.odometer,
            end_odometer: None,
            status: TripStatus::Draft,
            created_at: self.clock().now(),
            completed_at: None,
        };

        let mut changes = ChangeSet::new();
        changes.put(trip.clone());
        self.commit(changes)?;
        tracing::info!(
            "Created trip {} ({} -> {}, {}kg) with vehicle {} and driver {}",
            trip.id,
            trip.origin,
            trip.destination,
            trip.cargo_weight,
            trip.vehicle_id,
            trip.driver_id
        );
        Ok(trip)
    }

    /// Dispatches a Draft trip, putting its vehicle and driver On Trip.
    pub fn dispatch(&self, trip_id: &str) -> Result<Trip, CoreError> {
        let _guard = self.lock();

        let mut trip: Trip = self.load(trip_id)?;
        let next = transition(&trip, TripAction::Dispatch)?;

        // Draft trips do not reserve anything, so another trip may have taken
        // the vehicle or driver since this one was created.
        let mut vehicle: Vehicle = self.load(&trip.vehicle_id)?;
        ensure_vehicle_available(&vehicle)?;
        if let Some(active) = self.active_trips_for(&vehicle.id)?.first() {
            return Err(CoreError::Unavailable {
                kind: EntityKind::Vehicle,
                id: vehicle.id,
                status: format!("{} (trip {})", TripStatus::Dispatched, active.id),
            });
        }
        let mut driver: Driver = self.load(&trip.driver_id)?;
        ensure_driver_on_duty(&driver)?;

        trip.status = next;
        vehicle.status = VehicleStatus::OnTrip;
        driver.status = DriverStatus::OnTrip;

        let mut changes = ChangeSet::new();
        changes.put(trip.clone()).put(vehicle).put(driver);
        self.commit(changes)?;

        tracing::info!(
            "Dispatched trip {} (vehicle {}, driver {})",
            trip.id,
            trip.vehicle_id,
            trip.driver_id
        );
        Ok(trip)
    }

    /// Completes a Dispatched trip at `end_odometer`.
    ///
    /// The vehicle takes the new odometer reading and becomes Available, or
    /// stays In Shop while maintenance is open. The driver returns On Duty
    /// with one more completed trip.
    pub fn complete(&self, trip_id: &str, end_odometer: f64) -> Result<Trip, CoreError> {
        let _guard = self.lock();

        let mut trip: Trip = self.load(trip_id)?;
        let next = transition(&trip, TripAction::Complete)?;

        ensure_finite("end odometer", end_odometer)?;
        if end_odometer < trip.start_odometer {
            return Err(CoreError::OdometerRegression {
                start: trip.start_odometer,
                end: end_odometer,
            });
        }

        trip.status = next;
        trip.end_odometer = Some(end_odometer);
        trip.completed_at = Some(self.clock().now());

        let mut changes = ChangeSet::new();
        changes.put(trip.clone());
        if let Some(mut vehicle) = self.load_if_present::<Vehicle>(&trip.vehicle_id)? {
            vehicle.status = self.settled_status(&vehicle, &trip.id)?;
            vehicle.odometer = end_odometer;
            changes.put(vehicle);
        }
        if let Some(mut driver) = self.load_if_present::<Driver>(&trip.driver_id)? {
            driver.status = DriverStatus::OnDuty;
            driver.trips_completed += 1;
            changes.put(driver);
        }
        self.commit(changes)?;

        tracing::info!(
            "Completed trip {} after {}km",
            trip.id,
            end_odometer - trip.start_odometer
        );
        Ok(trip)
    }

    /// Cancels a Draft or Dispatched trip.
    ///
    /// Cancelling a Dispatched trip releases its vehicle and driver.
    pub fn cancel(&self, trip_id: &str) -> Result<Trip, CoreError> {
        let _guard = self.lock();

        let mut trip: Trip = self.load(trip_id)?;
        let next = transition(&trip, TripAction::Cancel)?;
        let was_dispatched = trip.status == TripStatus::Dispatched;

        let mut changes = ChangeSet::new();
        if was_dispatched {
            // Either may have been removed while the trip was out.
            if let Some(mut vehicle) = self.load_if_present::<Vehicle>(&trip.vehicle_id)? {
                vehicle.status = self.settled_status(&vehicle, &trip.id)?;
                changes.put(vehicle);
            }
            if let Some(mut driver) = self.load_if_present::<Driver>(&trip.driver_id)? {
                driver.status = DriverStatus::OnDuty;
                changes.put(driver);
            }
        }

        trip.status = next;
        changes.put(trip.clone());
        self.commit(changes)?;

        tracing::info!(
            "Cancelled trip {}{}",
            trip.id,
            if was_dispatched {
                " and released its vehicle and driver"
            } else {
                ""
            }
        );
        Ok(trip)
    }

    /// Returns the trips of `vehicle_id` that are Dispatched.
    pub fn active_trips_for(&self, vehicle_id: &str) -> Result<Vec<Trip>, CoreError> {
        Ok(self
            .trips()?
            .into_iter()
            .filter(|t| t.vehicle_id == vehicle_id && t.status == TripStatus::Dispatched)
            .collect())
    }
}
