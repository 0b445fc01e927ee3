//! Expenses: append and delete only, no effect on other records.

use crate::engine::{ensure_non_negative, FleetEngine};
use crate::error::CoreError;
use crate::record::{new_id, EntityKind, Expense, ExpenseType, Trip, Vehicle};
use crate::store::{ChangeSet, EntityStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Input for [`FleetEngine::record_expense`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
    pub vehicle_id: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    pub expense_type: ExpenseType,
    #[serde(default)]
    pub liters: f64,
    pub cost: f64,
    pub date: NaiveDate,
}

impl NewExpense {
    fn validate(&self) -> Result<(), CoreError> {
        ensure_non_negative("cost", self.cost)?;
        ensure_non_negative("liters", self.liters)?;
        if self.expense_type != ExpenseType::Fuel && self.liters != 0.0 {
            return Err(CoreError::validation(format!(
                "liters only apply to fuel expenses (got {} for {})",
                self.liters, self.expense_type
            )));
        }
        Ok(())
    }
}

impl<S: EntityStore> FleetEngine<S> {
    /// Records an expense against a vehicle and, optionally, one of its trips.
    pub fn record_expense(&self, new: NewExpense) -> Result<Expense, CoreError> {
        new.validate()?;

        let _guard = self.lock();

        let vehicle: Vehicle = self.load(&new.vehicle_id)?;
        if let Some(trip_id) = &new.trip_id {
            let trip: Trip = self.load(trip_id)?;
            if trip.vehicle_id != vehicle.id {
                return Err(CoreError::validation(format!(
                    "trip {} belongs to vehicle {}, not {}",
                    trip.id, trip.vehicle_id, vehicle.id
                )));
            }
        }

        let expense = Expense {
            id: new_id(EntityKind::Expense),
            vehicle_id: vehicle.id,
            trip_id: new.trip_id,
            expense_type: new.expense_type,
            liters: new.liters,
            cost: new.cost,
            date: new.date,
        };

        let mut changes = ChangeSet::new();
        changes.put(expense.clone());
        self.commit(changes)?;

        tracing::info!(
            "Recorded {} expense {} of {} for vehicle {}",
            expense.expense_type,
            expense.id,
            expense.cost,
            expense.vehicle_id
        );
        Ok(expense)
    }

    /// Deletes an expense.
    pub fn delete_expense(&self, expense_id: &str) -> Result<Expense, CoreError> {
        let _guard = self.lock();

        let expense: Expense = self.load(expense_id)?;
        let mut changes = ChangeSet::new();
        changes.delete(EntityKind::Expense, expense.id.as_str());
        self.commit(changes)?;

        tracing::info!("Deleted expense {}", expense.id);
        Ok(expense)
    }

    /// Returns the expenses recorded for a vehicle.
    pub fn expenses_for(&self, vehicle_id: &str) -> Result<Vec<Expense>, CoreError> {
        Ok(self
            .expenses()?
            .into_iter()
            .filter(|e| e.vehicle_id == vehicle_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::trip::NewTrip;

    fn fuel(liters: f64, cost: f64) -> NewExpense {
        NewExpense {
            vehicle_id: "veh-v".to_string(),
            trip_id: None,
            expense_type: ExpenseType::Fuel,
            liters,
            cost,
            date: today(),
        }
    }

    #[test]
    fn test_record_and_delete_expense() {
        let engine = seeded();
        let before = engine.vehicle("veh-v").unwrap();

        let expense = engine.record_expense(fuel(120.0, 11_400.0)).unwrap();
        assert!(expense.id.starts_with("exp-"));
        assert_eq!(engine.expenses_for("veh-v").unwrap(), vec![expense.clone()]);
        assert_eq!(engine.vehicle("veh-v").unwrap(), before);

        engine.delete_expense(&expense.id).unwrap();
        assert!(engine.expenses().unwrap().is_empty());
        assert!(matches!(
            engine.delete_expense(&expense.id).unwrap_err(),
            CoreError::NotFound {
                kind: EntityKind::Expense,
                ..
            }
        ));
    }

    #[test]
    fn test_expense_for_trip() {
        let engine = seeded();
        let trip = engine
            .create_trip(NewTrip {
                vehicle_id: "veh-v".to_string(),
                driver_id: "drv-d".to_string(),
                origin: "Surat".to_string(),
                destination: "Vadodara".to_string(),
                cargo_weight: 1500.0,
                revenue: Some(9000.0),
            })
            .unwrap();

        let mut toll = fuel(0.0, 350.0);
        toll.expense_type = ExpenseType::Toll;
        toll.trip_id = Some(trip.id.clone());
        let expense = engine.record_expense(toll).unwrap();
        assert_eq!(expense.trip_id, Some(trip.id));

        let mut other_vehicle = truck("veh-w");
        other_vehicle.license_plate = "GJ-05-ZZ-0001".to_string();
        engine.store().put(other_vehicle.into()).unwrap();

        let mut wrong = fuel(10.0, 900.0);
        wrong.vehicle_id = "veh-w".to_string();
        wrong.trip_id = expense.trip_id.clone();
        assert!(matches!(
            engine.record_expense(wrong).unwrap_err(),
            CoreError::Validation { .. }
        ));
    }

    #[test]
    fn test_expense_references_must_exist() {
        let engine = seeded();

        let mut new = fuel(10.0, 900.0);
        new.vehicle_id = "veh-404".to_string();
        assert!(matches!(
            engine.record_expense(new).unwrap_err(),
            CoreError::NotFound {
                kind: EntityKind::Vehicle,
                ..
            }
        ));

        let mut new = fuel(10.0, 900.0);
        new.trip_id = Some("trp-404".to_string());
        assert!(matches!(
            engine.record_expense(new).unwrap_err(),
            CoreError::NotFound {
                kind: EntityKind::Trip,
                ..
            }
        ));
    }

    #[test]
    fn test_liters_only_for_fuel() {
        let engine = seeded();
        let mut new = fuel(40.0, 500.0);
        new.expense_type = ExpenseType::Other;
        assert!(matches!(
            engine.record_expense(new).unwrap_err(),
            CoreError::Validation { .. }
        ));

        assert!(engine.record_expense(fuel(-1.0, 500.0)).is_err());
        assert!(engine.record_expense(fuel(1.0, -500.0)).is_err());
        assert!(engine.expenses().unwrap().is_empty());
    }
}
