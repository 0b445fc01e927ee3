//! Maintenance lifecycle: In Progress -> Completed.
//!
//! Logging a service sends the vehicle to the shop; completing the last open
//! service on a vehicle brings it back into the available pool.

use crate::engine::{ensure_non_negative, ensure_present, FleetEngine};
use crate::error::CoreError;
use crate::record::{
    new_id, EntityKind, Maintenance, MaintenanceStatus, Vehicle, VehicleStatus,
};
use crate::store::{ChangeSet, EntityStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Input for [`FleetEngine::log_service`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewService {
    pub vehicle_id: String,
    pub service_type: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cost: f64,
    pub service_date: NaiveDate,
    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,
}

impl NewService {
    fn validate(&self) -> Result<(), CoreError> {
        ensure_present("service type", &self.service_type)?;
        ensure_non_negative("cost", self.cost)?;
        if let Some(next) = self.next_due_date {
            if next < self.service_date {
                return Err(CoreError::validation(format!(
                    "next due date {} is before service date {}",
                    next, self.service_date
                )));
            }
        }
        Ok(())
    }
}

impl<S: EntityStore> FleetEngine<S> {
    /// Opens a maintenance record and moves the vehicle In Shop.
    ///
    /// A Retired vehicle keeps its status.
    pub fn log_service(&self, new: NewService) -> Result<Maintenance, CoreError> {
        new.validate()?;

        let _guard = self.lock();

        let mut vehicle: Vehicle = self.load(&new.vehicle_id)?;

        let record = Maintenance {
            id: new_id(EntityKind::Maintenance),
            vehicle_id: vehicle.id.clone(),
            service_type: new.service_type,
            description: new.description,
            cost: new.cost,
            service_date: new.service_date,
            next_due_date: new.next_due_date,
            status: MaintenanceStatus::InProgress,
        };

        let mut changes = ChangeSet::new();
        changes.put(record.clone());
        if vehicle.status != VehicleStatus::Retired {
            if vehicle.status == VehicleStatus::OnTrip {
                tracing::warn!(
                    "Vehicle {} sent to the shop while on a trip",
                    vehicle.id
                );
            }
            vehicle.status = VehicleStatus::InShop;
            changes.put(vehicle);
        }
        self.commit(changes)?;

        tracing::info!(
            "Logged {} service {} for vehicle {}",
            record.service_type,
            record.id,
            record.vehicle_id
        );
        Ok(record)
    }

    /// Closes an In Progress maintenance record.
    ///
    /// The vehicle leaves the shop only when this was its last open record.
    /// It then goes back On Trip if a trip is still Dispatched on it, and
    /// Available otherwise. A Retired vehicle stays Retired.
    pub fn complete_service(&self, maintenance_id: &str) -> Result<Maintenance, CoreError> {
        let _guard = self.lock();

        let mut record: Maintenance = self.load(maintenance_id)?;
        if record.status != MaintenanceStatus::InProgress {
            return Err(CoreError::InvalidTransition {
                kind: EntityKind::Maintenance,
                id: record.id,
                state: record.status.to_string(),
                action: "complete",
            });
        }

        let still_open = self
            .open_services_for(&record.vehicle_id)?
            .iter()
            .any(|m| m.id != record.id);

        record.status = MaintenanceStatus::Completed;
        let mut changes = ChangeSet::new();
        changes.put(record.clone());

        // A removed vehicle does not stop the record from closing.
        if let Some(mut vehicle) = self.load_if_present::<Vehicle>(&record.vehicle_id)? {
            let settled = self.settled_status(&vehicle, &record.id)?;
            if settled != vehicle.status {
                vehicle.status = settled;
                changes.put(vehicle);
            }
        }
        self.commit(changes)?;

        tracing::info!(
            "Completed service {} for vehicle {}{}",
            record.id,
            record.vehicle_id,
            if still_open {
                " (other services still open)"
            } else {
                ""
            }
        );
        Ok(record)
    }

    /// Returns the In Progress maintenance records of a vehicle.
    pub fn open_services_for(&self, vehicle_id: &str) -> Result<Vec<Maintenance>, CoreError> {
        Ok(self
            .maintenance_records()?
            .into_iter()
            .filter(|m| m.vehicle_id == vehicle_id && m.status == MaintenanceStatus::InProgress)
            .collect())
    }

    /// Returns maintenance records whose next due date is on or before `date`.
    pub fn services_due_by(&self, date: NaiveDate) -> Result<Vec<Maintenance>, CoreError> {
        Ok(self
            .maintenance_records()?
            .into_iter()
            .filter(|m| m.next_due_date.is_some_and(|due| due <= date))
            .collect())
    }
}
