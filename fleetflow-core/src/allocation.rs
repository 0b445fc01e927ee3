//! Allocation checks run before a trip is created.
//!
//! Everything here is pure: inputs are passed in explicitly, including the
//! date to compare license expiry against.

use crate::error::{CoreError, LicenseProblem};
use crate::record::{Driver, DriverStatus, EntityKind, Vehicle, VehicleStatus, VehicleType};
use chrono::{Days, NaiveDate};

/// Returns true if `weight` fits within `max_capacity`.
pub fn fits_capacity(weight: f64, max_capacity: f64) -> bool {
    weight <= max_capacity
}

/// Returns true if the driver may drive `vehicle_type` on `today`.
pub fn license_valid(driver: &Driver, vehicle_type: VehicleType, today: NaiveDate) -> bool {
    license_problem(driver, vehicle_type, today).is_none()
}

/// Explains why the driver's license does not cover `vehicle_type`, if it
/// does not. Expiry is checked before category.
pub fn license_problem(
    driver: &Driver,
    vehicle_type: VehicleType,
    today: NaiveDate,
) -> Option<LicenseProblem> {
    if driver.license_expiry < today {
        return Some(LicenseProblem::Expired {
            expiry: driver.license_expiry,
        });
    }
    if !driver.license_categories.contains(&vehicle_type) {
        return Some(LicenseProblem::MissingCategory);
    }
    None
}

/// Returns true if the license expires before `today + within_days`.
pub fn license_expires_within(driver: &Driver, today: NaiveDate, within_days: u32) -> bool {
    match today.checked_add_days(Days::new(within_days as u64)) {
        Some(horizon) => driver.license_expiry < horizon,
        None => true,
    }
}

/// Checks whether `vehicle` and `driver` can be allocated to a new trip
/// carrying `cargo_weight`, reporting the first violated condition:
///
/// 1. the vehicle is Available
/// 2. the driver is On Duty
/// 3. the cargo fits the vehicle
/// 4. the driver's license is current and covers the vehicle type
pub fn check_allocation(
    vehicle: &Vehicle,
    driver: &Driver,
    cargo_weight: f64,
    today: NaiveDate,
) -> Result<(), CoreError> {
    ensure_vehicle_available(vehicle)?;
    ensure_driver_on_duty(driver)?;

    if !fits_capacity(cargo_weight, vehicle.max_capacity) {
        return Err(CoreError::CapacityExceeded {
            weight: cargo_weight,
            limit: vehicle.max_capacity,
        });
    }

    if let Some(problem) = license_problem(driver, vehicle.vehicle_type, today) {
        return Err(CoreError::LicenseInvalid {
            driver_id: driver.id.clone(),
            vehicle_type: vehicle.vehicle_type,
            problem,
        });
    }

    Ok(())
}

pub(crate) fn ensure_vehicle_available(vehicle: &Vehicle) -> Result<(), CoreError> {
    if vehicle.status != VehicleStatus::Available {
        return Err(CoreError::Unavailable {
            kind: EntityKind::Vehicle,
            id: vehicle.id.clone(),
            status: vehicle.status.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_driver_on_duty(driver: &Driver) -> Result<(), CoreError> {
    if driver.status != DriverStatus::OnDuty {
        return Err(CoreError::Unavailable {
            kind: EntityKind::Driver,
            id: driver.id.clone(),
            status: driver.status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Region;
    use std::collections::BTreeSet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn truck() -> Vehicle {
        Vehicle {
            id: "veh-1".to_string(),
            name: "Tata Prima".to_string(),
            model: "4028.S".to_string(),
            license_plate: "MH-04-XY-9876".to_string(),
            vehicle_type: VehicleType::Truck,
            max_capacity: 4000.0,
            odometer: 5000.0,
            status: VehicleStatus::Available,
            region: Region::West,
            acquisition_cost: None,
        }
    }

    fn driver(categories: &[VehicleType], expiry: NaiveDate) -> Driver {
        Driver {
            id: "drv-1".to_string(),
            name: "Ravi".to_string(),
            phone: "555-0101".to_string(),
            license_categories: categories.iter().copied().collect::<BTreeSet<_>>(),
            license_expiry: expiry,
            status: DriverStatus::OnDuty,
            trips_completed: 0,
            safety_score: 90.0,
        }
    }

    #[test]
    fn test_fits_capacity_boundary() {
        assert!(fits_capacity(3500.0, 4000.0));
        assert!(fits_capacity(4000.0, 4000.0));
        assert!(!fits_capacity(4000.5, 4000.0));
    }

    #[test]
    fn test_license_valid() {
        let today = date(2025, 6, 1);
        let d = driver(&[VehicleType::Truck, VehicleType::Van], date(2026, 1, 1));

        assert!(license_valid(&d, VehicleType::Truck, today));
        assert!(license_valid(&d, VehicleType::Van, today));
        assert!(!license_valid(&d, VehicleType::Bike, today));
    }

    #[test]
    fn test_license_expiring_today_is_still_valid() {
        let today = date(2025, 6, 1);
        let d = driver(&[VehicleType::Truck], today);
        assert!(license_valid(&d, VehicleType::Truck, today));

        let yesterday = date(2025, 5, 31);
        let d = driver(&[VehicleType::Truck], yesterday);
        assert_eq!(
            license_problem(&d, VehicleType::Truck, today),
            Some(LicenseProblem::Expired { expiry: yesterday })
        );
    }

    #[test]
    fn test_license_expires_within() {
        let today = date(2025, 6, 1);
        let soon = driver(&[VehicleType::Van], date(2025, 7, 15));
        let later = driver(&[VehicleType::Van], date(2026, 7, 15));

        assert!(license_expires_within(&soon, today, 90));
        assert!(!license_expires_within(&later, today, 90));
    }

    #[test]
    fn test_check_allocation_order() {
        let today = date(2025, 6, 1);
        let mut v = truck();
        let mut d = driver(&[VehicleType::Van], date(2020, 1, 1));

        // Every condition fails; the vehicle status is reported first.
        v.status = VehicleStatus::InShop;
        d.status = DriverStatus::Suspended;
        assert!(matches!(
            check_allocation(&v, &d, 9000.0, today),
            Err(CoreError::Unavailable {
                kind: EntityKind::Vehicle,
                ..
            })
        ));

        v.status = VehicleStatus::Available;
        assert!(matches!(
            check_allocation(&v, &d, 9000.0, today),
            Err(CoreError::Unavailable {
                kind: EntityKind::Driver,
                ..
            })
        ));

        d.status = DriverStatus::OnDuty;
        assert!(matches!(
            check_allocation(&v, &d, 9000.0, today),
            Err(CoreError::CapacityExceeded { weight, limit }) if weight == 9000.0 && limit == 4000.0
        ));

        assert!(matches!(
            check_allocation(&v, &d, 3500.0, today),
            Err(CoreError::LicenseInvalid {
                vehicle_type: VehicleType::Truck,
                problem: LicenseProblem::Expired { .. },
                ..
            })
        ));

        d.license_expiry = date(2027, 1, 1);
        assert!(matches!(
            check_allocation(&v, &d, 3500.0, today),
            Err(CoreError::LicenseInvalid {
                problem: LicenseProblem::MissingCategory,
                ..
            })
        ));

        d.license_categories.insert(VehicleType::Truck);
        assert!(check_allocation(&v, &d, 3500.0, today).is_ok());
    }
}
