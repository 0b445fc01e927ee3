//! Fleet registry: registering, retiring and removing vehicles and drivers.
//!
//! None of these operations may touch a vehicle or driver that a Dispatched
//! trip uses; only the trip lifecycle moves records in and out of On Trip.

use crate::allocation::license_expires_within;
use crate::engine::{ensure_non_negative, ensure_positive, ensure_present, FleetEngine};
use crate::error::CoreError;
use crate::record::{
    new_id, Driver, DriverStatus, EntityKind, Region, Vehicle, VehicleStatus, VehicleType,
};
use crate::store::{ChangeSet, EntityStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Safety score given to newly registered drivers.
pub const DEFAULT_SAFETY_SCORE: f64 = 85.0;

/// Window used when warning about licenses that are about to expire.
pub const LICENSE_WARNING_DAYS: u32 = 90;

/// Input for [`FleetEngine::register_vehicle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub name: String,
    pub model: String,
    pub license_plate: String,
    pub vehicle_type: VehicleType,
    pub max_capacity: f64,
    #[serde(default)]
    pub odometer: f64,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub acquisition_cost: Option<f64>,
}

impl NewVehicle {
    fn validate(&self) -> Result<(), CoreError> {
        ensure_present("name", &self.name)?;
        ensure_present("license plate", &self.license_plate)?;
        ensure_positive("max capacity", self.max_capacity)?;
        ensure_non_negative("odometer", self.odometer)?;
        if let Some(cost) = self.acquisition_cost {
            ensure_non_negative("acquisition cost", cost)?;
        }
        Ok(())
    }
}

/// Input for [`FleetEngine::register_driver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDriver {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    pub license_categories: BTreeSet<VehicleType>,
    pub license_expiry: NaiveDate,
    #[serde(default)]
    pub safety_score: Option<f64>,
}

impl NewDriver {
    fn validate(&self) -> Result<(), CoreError> {
        ensure_present("name", &self.name)?;
        if self.license_categories.is_empty() {
            return Err(CoreError::validation(
                "license must list at least one vehicle category",
            ));
        }
        if let Some(score) = self.safety_score {
            if !(0.0..=100.0).contains(&score) {
                return Err(CoreError::validation(format!(
                    "safety score must be between 0 and 100 (got {})",
                    score
                )));
            }
        }
        Ok(())
    }
}

fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

fn refuse_on_trip_driver(driver: &Driver, action: &'static str) -> Result<(), CoreError> {
    if driver.status == DriverStatus::OnTrip {
        return Err(CoreError::InvalidTransition {
            kind: EntityKind::Driver,
            id: driver.id.clone(),
            state: driver.status.to_string(),
            action,
        });
    }
    Ok(())
}

impl<S: EntityStore> FleetEngine<S> {
    // =========================================================================
    // Vehicles
    // =========================================================================

    /// Refuses `action` while a Dispatched trip still uses the vehicle, even
    /// if maintenance has moved it In Shop meanwhile.
    fn refuse_busy_vehicle(
        &self,
        vehicle: &Vehicle,
        action: &'static str,
    ) -> Result<(), CoreError> {
        let active = self.active_trips_for(&vehicle.id)?;
        if vehicle.status != VehicleStatus::OnTrip && active.is_empty() {
            return Ok(());
        }
        let state = match active.first() {
            Some(trip) => format!("{}, trip {} {}", vehicle.status, trip.id, trip.status),
            None => vehicle.status.to_string(),
        };
        Err(CoreError::InvalidTransition {
            kind: EntityKind::Vehicle,
            id: vehicle.id.clone(),
            state,
            action,
        })
    }

    /// Registers an Available vehicle. License plates must be unique.
    pub fn register_vehicle(&self, new: NewVehicle) -> Result<Vehicle, CoreError> {
        new.validate()?;

        let _guard = self.lock();

        let plate = normalize_plate(&new.license_plate);
        if let Some(existing) = self
            .vehicles()?
            .into_iter()
            .find(|v| normalize_plate(&v.license_plate) == plate)
        {
            return Err(CoreError::validation(format!(
                "license plate {} is already registered to vehicle {}",
                new.license_plate, existing.id
            )));
        }

        let vehicle = Vehicle {
            id: new_id(EntityKind::Vehicle),
            name: new.name,
            model: new.model,
            license_plate: new.license_plate.trim().to_string(),
            vehicle_type: new.vehicle_type,
            max_capacity: new.max_capacity,
            odometer: new.odometer,
            status: VehicleStatus::Available,
            region: new.region,
            acquisition_cost: new.acquisition_cost,
        };

        let mut changes = ChangeSet::new();
        changes.put(vehicle.clone());
        self.commit(changes)?;

        tracing::info!(
            "Registered {} {} ({})",
            vehicle.vehicle_type,
            vehicle.id,
            vehicle.license_plate
        );
        Ok(vehicle)
    }

    /// Takes a vehicle out of service.
    pub fn retire_vehicle(&self, vehicle_id: &str) -> Result<Vehicle, CoreError> {
        let _guard = self.lock();

        let mut vehicle: Vehicle = self.load(vehicle_id)?;
        self.refuse_busy_vehicle(&vehicle, "retire")?;
        if vehicle.status == VehicleStatus::Retired {
            return Err(CoreError::InvalidTransition {
                kind: EntityKind::Vehicle,
                id: vehicle.id,
                state: vehicle.status.to_string(),
                action: "retire",
            });
        }

        vehicle.status = VehicleStatus::Retired;
        let mut changes = ChangeSet::new();
        changes.put(vehicle.clone());
        self.commit(changes)?;

        tracing::info!("Retired vehicle {}", vehicle.id);
        Ok(vehicle)
    }

    /// Returns a Retired vehicle to service.
    ///
    /// A vehicle with open maintenance comes back In Shop rather than
    /// Available.
    pub fn reactivate_vehicle(&self, vehicle_id: &str) -> Result<Vehicle, CoreError> {
        let _guard = self.lock();

        let mut vehicle: Vehicle = self.load(vehicle_id)?;
        if vehicle.status != VehicleStatus::Retired {
            return Err(CoreError::InvalidTransition {
                kind: EntityKind::Vehicle,
                id: vehicle.id,
                state: vehicle.status.to_string(),
                action: "reactivate",
            });
        }

        vehicle.status = if self.open_services_for(&vehicle.id)?.is_empty() {
            VehicleStatus::Available
        } else {
            VehicleStatus::InShop
        };
        let mut changes = ChangeSet::new();
        changes.put(vehicle.clone());
        self.commit(changes)?;

        tracing::info!("Reactivated vehicle {} as {}", vehicle.id, vehicle.status);
        Ok(vehicle)
    }

    /// Deletes a vehicle that no Dispatched trip uses.
    pub fn remove_vehicle(&self, vehicle_id: &str) -> Result<Vehicle, CoreError> {
        let _guard = self.lock();

        let vehicle: Vehicle = self.load(vehicle_id)?;
        self.refuse_busy_vehicle(&vehicle, "remove")?;

        let mut changes = ChangeSet::new();
        changes.delete(EntityKind::Vehicle, vehicle.id.as_str());
        self.commit(changes)?;

        tracing::info!("Removed vehicle {}", vehicle.id);
        Ok(vehicle)
    }

    // =========================================================================
    // Drivers
    // =========================================================================

    /// Registers an On Duty driver.
    pub fn register_driver(&self, new: NewDriver) -> Result<Driver, CoreError> {
        new.validate()?;

        let _guard = self.lock();

        let driver = Driver {
            id: new_id(EntityKind::Driver),
            name: new.name,
            phone: new.phone,
            license_categories: new.license_categories,
            license_expiry: new.license_expiry,
            status: DriverStatus::OnDuty,
            trips_completed: 0,
            safety_score: new.safety_score.unwrap_or(DEFAULT_SAFETY_SCORE),
        };

        if driver.license_expiry < self.clock().today() {
            tracing::warn!(
                "Registering driver {} with a license that expired on {}",
                driver.name,
                driver.license_expiry
            );
        }

        let mut changes = ChangeSet::new();
        changes.put(driver.clone());
        self.commit(changes)?;

        tracing::info!("Registered driver {} ({})", driver.id, driver.name);
        Ok(driver)
    }

    /// Sets a driver On Duty, Off Duty or Suspended.
    ///
    /// On Trip is reserved for dispatch, and a driver on a trip keeps that
    /// status until the trip completes or is cancelled.
    pub fn set_driver_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<Driver, CoreError> {
        if status == DriverStatus::OnTrip {
            return Err(CoreError::validation(
                "drivers are put On Trip only by dispatching a trip",
            ));
        }

        let _guard = self.lock();

        let mut driver: Driver = self.load(driver_id)?;
        refuse_on_trip_driver(&driver, "change status of")?;

        let previous = driver.status;
        driver.status = status;
        let mut changes = ChangeSet::new();
        changes.put(driver.clone());
        self.commit(changes)?;

        tracing::info!("Driver {} status {} -> {}", driver.id, previous, status);
        Ok(driver)
    }

    /// Deletes a driver that is not On Trip.
    pub fn remove_driver(&self, driver_id: &str) -> Result<Driver, CoreError> {
        let _guard = self.lock();

        let driver: Driver = self.load(driver_id)?;
        refuse_on_trip_driver(&driver, "remove")?;

        let mut changes = ChangeSet::new();
        changes.delete(EntityKind::Driver, driver.id.as_str());
        self.commit(changes)?;

        tracing::info!("Removed driver {}", driver.id);
        Ok(driver)
    }

    /// Returns drivers whose license expires within `within_days` of today,
    /// including those already expired, soonest first.
    pub fn expiring_licenses(&self, within_days: u32) -> Result<Vec<Driver>, CoreError> {
        let today = self.clock().today();
        let mut drivers: Vec<Driver> = self
            .drivers()?
            .into_iter()
            .filter(|d| license_expires_within(d, today, within_days))
            .collect();
        drivers.sort_by_key(|d| d.license_expiry);
        Ok(drivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::maintenance::NewService;
    use crate::trip::NewTrip;

    fn van(plate: &str) -> NewVehicle {
        NewVehicle {
            name: "Force Traveller".to_string(),
            model: "T1".to_string(),
            license_plate: plate.to_string(),
            vehicle_type: VehicleType::Van,
            max_capacity: 1200.0,
            odometer: 0.0,
            region: Region::South,
            acquisition_cost: Some(900_000.0),
        }
    }

    fn new_driver(expiry: NaiveDate) -> NewDriver {
        NewDriver {
            name: "Meena".to_string(),
            phone: "555-0142".to_string(),
            license_categories: BTreeSet::from([VehicleType::Van, VehicleType::Bike]),
            license_expiry: expiry,
            safety_score: None,
        }
    }

    fn dispatch_trip(engine: &FleetEngine<crate::store::MemoryStore>) -> String {
        let trip = engine
            .create_trip(NewTrip {
                vehicle_id: "veh-v".to_string(),
                driver_id: "drv-d".to_string(),
                origin: "Nagpur".to_string(),
                destination: "Nashik".to_string(),
                cargo_weight: 800.0,
                revenue: None,
            })
            .unwrap();
        engine.dispatch(&trip.id).unwrap();
        trip.id
    }

    #[test]
    fn test_register_vehicle() {
        let engine = engine();
        let vehicle = engine.register_vehicle(van("KA-01-AB-1111")).unwrap();

        assert!(vehicle.id.starts_with("veh-"));
        assert_eq!(vehicle.status, VehicleStatus::Available);
        assert_eq!(engine.vehicle(&vehicle.id).unwrap(), vehicle);
    }

    #[test]
    fn test_register_vehicle_duplicate_plate() {
        let engine = engine();
        engine.register_vehicle(van("KA-01-AB-1111")).unwrap();

        let err = engine.register_vehicle(van(" ka01ab1111 ")).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert_eq!(engine.vehicles().unwrap().len(), 1);
    }

    #[test]
    fn test_register_vehicle_validation() {
        let engine = engine();
        let mut new = van("KA-01-AB-2222");
        new.max_capacity = 0.0;
        assert!(engine.register_vehicle(new).is_err());

        let mut new = van("KA-01-AB-2222");
        new.odometer = -10.0;
        assert!(engine.register_vehicle(new).is_err());
        assert!(engine.vehicles().unwrap().is_empty());
    }

    #[test]
    fn test_register_driver_defaults() {
        let engine = engine();
        let driver = engine
            .register_driver(new_driver(NaiveDate::from_ymd_opt(2028, 1, 1).unwrap()))
            .unwrap();

        assert_eq!(driver.status, DriverStatus::OnDuty);
        assert_eq!(driver.safety_score, DEFAULT_SAFETY_SCORE);
        assert_eq!(driver.trips_completed, 0);
    }

    #[test]
    fn test_register_driver_validation() {
        let engine = engine();
        let expiry = NaiveDate::from_ymd_opt(2028, 1, 1).unwrap();

        let mut new = new_driver(expiry);
        new.license_categories.clear();
        assert!(matches!(
            engine.register_driver(new).unwrap_err(),
            CoreError::Validation { .. }
        ));

        let mut new = new_driver(expiry);
        new.safety_score = Some(101.0);
        assert!(engine.register_driver(new).is_err());
    }

    #[test]
    fn test_retire_and_reactivate() {
        let engine = seeded();
        let vehicle = engine.retire_vehicle("veh-v").unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Retired);
        assert!(engine.retire_vehicle("veh-v").is_err());

        let vehicle = engine.reactivate_vehicle("veh-v").unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Available);
        assert!(matches!(
            engine.reactivate_vehicle("veh-v").unwrap_err(),
            CoreError::InvalidTransition {
                action: "reactivate",
                ..
            }
        ));
    }

    #[test]
    fn test_reactivate_with_open_service_goes_to_shop() {
        let engine = seeded();
        engine.retire_vehicle("veh-v").unwrap();
        engine
            .log_service(NewService {
                vehicle_id: "veh-v".to_string(),
                service_type: "Engine Overhaul".to_string(),
                description: None,
                cost: 60_000.0,
                service_date: today(),
                next_due_date: None,
            })
            .unwrap();

        let vehicle = engine.reactivate_vehicle("veh-v").unwrap();
        assert_eq!(vehicle.status, VehicleStatus::InShop);
    }

    #[test]
    fn test_on_trip_records_are_protected() {
        let engine = seeded();
        dispatch_trip(&engine);

        for err in [
            engine.retire_vehicle("veh-v").unwrap_err(),
            engine.remove_vehicle("veh-v").unwrap_err(),
            engine
                .set_driver_status("drv-d", DriverStatus::OffDuty)
                .unwrap_err(),
            engine.remove_driver("drv-d").unwrap_err(),
        ] {
            assert!(matches!(err, CoreError::InvalidTransition { .. }));
        }
        assert_eq!(engine.vehicle("veh-v").unwrap().status, VehicleStatus::OnTrip);
        assert_eq!(engine.driver("drv-d").unwrap().status, DriverStatus::OnTrip);
    }

    #[test]
    fn test_vehicle_in_shop_mid_trip_is_protected() {
        let engine = seeded();
        let trip_id = dispatch_trip(&engine);
        engine
            .log_service(NewService {
                vehicle_id: "veh-v".to_string(),
                service_type: "Tyre Puncture".to_string(),
                description: None,
                cost: 800.0,
                service_date: today(),
                next_due_date: None,
            })
            .unwrap();
        assert_eq!(engine.vehicle("veh-v").unwrap().status, VehicleStatus::InShop);

        for err in [
            engine.remove_vehicle("veh-v").unwrap_err(),
            engine.retire_vehicle("veh-v").unwrap_err(),
        ] {
            assert!(matches!(
                err,
                CoreError::InvalidTransition { ref state, .. } if state.contains(&trip_id)
            ));
        }
        assert!(engine.vehicle("veh-v").is_ok());

        // The trip can still finish and release its driver.
        engine.cancel(&trip_id).unwrap();
        assert_eq!(engine.driver("drv-d").unwrap().status, DriverStatus::OnDuty);
        engine.remove_vehicle("veh-v").unwrap();
    }

    #[test]
    fn test_set_driver_status() {
        let engine = seeded();
        let driver = engine
            .set_driver_status("drv-d", DriverStatus::Suspended)
            .unwrap();
        assert_eq!(driver.status, DriverStatus::Suspended);

        assert!(matches!(
            engine
                .set_driver_status("drv-d", DriverStatus::OnTrip)
                .unwrap_err(),
            CoreError::Validation { .. }
        ));
        assert!(matches!(
            engine
                .set_driver_status("drv-404", DriverStatus::OnDuty)
                .unwrap_err(),
            CoreError::NotFound { .. }
        ));
    }

    #[test]
    fn test_remove_records() {
        let engine = seeded();
        engine.remove_vehicle("veh-v").unwrap();
        engine.remove_driver("drv-d").unwrap();

        assert!(engine.vehicles().unwrap().is_empty());
        assert!(engine.drivers().unwrap().is_empty());
        assert!(matches!(
            engine.remove_vehicle("veh-v").unwrap_err(),
            CoreError::NotFound { .. }
        ));
    }

    #[test]
    fn test_expiring_licenses() {
        let engine = seeded();
        let soon = engine
            .register_driver(new_driver(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()))
            .unwrap();
        let expired = engine
            .register_driver(new_driver(NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()))
            .unwrap();

        let ids: Vec<String> = engine
            .expiring_licenses(LICENSE_WARNING_DAYS)
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![expired.id, soon.id]);
    }
}
