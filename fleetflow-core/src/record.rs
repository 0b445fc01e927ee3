//! Fleet records.
//!
//! Every record is identified by an opaque string id. Dates are calendar
//! dates (`NaiveDate`), whose ordering matches the lexical ordering of their
//! ISO-8601 text; timestamps are UTC instants.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of record held by the entity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Vehicle,
    Driver,
    Trip,
    Maintenance,
    Expense,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Vehicle,
        EntityKind::Driver,
        EntityKind::Trip,
        EntityKind::Maintenance,
        EntityKind::Expense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Vehicle => "vehicle",
            EntityKind::Driver => "driver",
            EntityKind::Trip => "trip",
            EntityKind::Maintenance => "maintenance",
            EntityKind::Expense => "expense",
        }
    }

    /// Parses the name produced by [`EntityKind::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Prefix used for generated ids.
    pub(crate) fn id_prefix(&self) -> &'static str {
        match self {
            EntityKind::Vehicle => "veh",
            EntityKind::Driver => "drv",
            EntityKind::Trip => "trp",
            EntityKind::Maintenance => "mnt",
            EntityKind::Expense => "exp",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =========================================================================
// Enumerations
// =========================================================================

/// Vehicle class, also used as a driver license category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    Truck,
    Van,
    Bike,
}

/// Operating region of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Region {
    #[default]
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VehicleStatus {
    #[default]
    Available,
    OnTrip,
    InShop,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriverStatus {
    #[default]
    OnDuty,
    OffDuty,
    OnTrip,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TripStatus {
    #[default]
    Draft,
    Dispatched,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaintenanceStatus {
    #[default]
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpenseType {
    #[default]
    Fuel,
    Toll,
    Maintenance,
    Other,
}

macro_rules! display_as {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $text),+
                })
            }
        }
    };
}

display_as!(VehicleType { Truck => "Truck", Van => "Van", Bike => "Bike" });
display_as!(Region { North => "North", South => "South", East => "East", West => "West" });
display_as!(VehicleStatus {
    Available => "Available",
    OnTrip => "On Trip",
    InShop => "In Shop",
    Retired => "Retired",
});
display_as!(DriverStatus {
    OnDuty => "On Duty",
    OffDuty => "Off Duty",
    OnTrip => "On Trip",
    Suspended => "Suspended",
});
display_as!(TripStatus {
    Draft => "Draft",
    Dispatched => "Dispatched",
    Completed => "Completed",
    Cancelled => "Cancelled",
});
display_as!(MaintenanceStatus {
    InProgress => "In Progress",
    Completed => "Completed",
});
display_as!(ExpenseType {
    Fuel => "Fuel",
    Toll => "Toll",
    Maintenance => "Maintenance",
    Other => "Other",
});

/// Parses a variant name, ignoring case, spaces, dashes and underscores, so
/// "OnDuty", "on duty" and "on_duty" all parse.
macro_rules! from_str_loose {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key: String = s
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .flat_map(char::to_lowercase)
                    .collect();
                $(
                    if key == stringify!($variant).to_lowercase() {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("unknown {} '{}'", stringify!($ty), s))
            }
        }
    };
}

from_str_loose!(VehicleType { Truck, Van, Bike });
from_str_loose!(Region { North, South, East, West });
from_str_loose!(VehicleStatus { Available, OnTrip, InShop, Retired });
from_str_loose!(DriverStatus { OnDuty, OffDuty, OnTrip, Suspended });
from_str_loose!(TripStatus { Draft, Dispatched, Completed, Cancelled });
from_str_loose!(MaintenanceStatus { InProgress, Completed });
from_str_loose!(ExpenseType { Fuel, Toll, Maintenance, Other });

// =========================================================================
// Records
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub name: String,
    pub model: String,
    pub license_plate: String,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
    /// Maximum cargo weight in kg.
    pub max_capacity: f64,
    /// Odometer reading in km.
    pub odometer: f64,
    pub status: VehicleStatus,
    pub region: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub license_categories: BTreeSet<VehicleType>,
    pub license_expiry: NaiveDate,
    pub status: DriverStatus,
    pub trips_completed: u32,
    /// Safety score between 0 and 100.
    pub safety_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub vehicle_id: String,
    pub driver_id: String,
    pub origin: String,
    pub destination: String,
    /// Cargo weight in kg.
    pub cargo_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<f64>,
    /// Vehicle odometer when the trip was created.
    pub start_odometer: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_odometer: Option<f64>,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Trip {
    /// Distance covered by a completed trip.
    pub fn distance(&self) -> Option<f64> {
        self.end_odometer.map(|end| end - self.start_odometer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maintenance {
    pub id: String,
    pub vehicle_id: String,
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cost: f64,
    pub service_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_due_date: Option<NaiveDate>,
    pub status: MaintenanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub vehicle_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    #[serde(rename = "type")]
    pub expense_type: ExpenseType,
    /// Fuel volume; zero for anything but fuel.
    #[serde(default)]
    pub liters: f64,
    pub cost: f64,
    pub date: NaiveDate,
}

/// Any record held by the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Vehicle(Vehicle),
    Driver(Driver),
    Trip(Trip),
    Maintenance(Maintenance),
    Expense(Expense),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Vehicle(_) => EntityKind::Vehicle,
            Record::Driver(_) => EntityKind::Driver,
            Record::Trip(_) => EntityKind::Trip,
            Record::Maintenance(_) => EntityKind::Maintenance,
            Record::Expense(_) => EntityKind::Expense,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Vehicle(r) => &r.id,
            Record::Driver(r) => &r.id,
            Record::Trip(r) => &r.id,
            Record::Maintenance(r) => &r.id,
            Record::Expense(r) => &r.id,
        }
    }
}

/// A concrete record type that can be stored and fetched by id.
pub trait Entity: Sized {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn into_record(self) -> Record;

    /// Extracts the concrete record, or `None` if `record` is another kind.
    fn from_record(record: Record) -> Option<Self>;
}

macro_rules! entity {
    ($ty:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn id(&self) -> &str {
                &self.id
            }

            fn into_record(self) -> Record {
                Record::$ty(self)
            }

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$ty(r) => Some(r),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Record {
            fn from(r: $ty) -> Self {
                Record::$ty(r)
            }
        }
    };
}

entity!(Vehicle);
entity!(Driver);
entity!(Trip);
entity!(Maintenance);
entity!(Expense);

/// Generates a fresh id for a record of the given kind.
pub(crate) fn new_id(kind: EntityKind) -> String {
    format!("{}-{}", kind.id_prefix(), uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vehicle() -> Vehicle {
        Vehicle {
            id: "veh-1".to_string(),
            name: "Volvo FH".to_string(),
            model: "FH16".to_string(),
            license_plate: "MH-12-AB-1234".to_string(),
            vehicle_type: VehicleType::Truck,
            max_capacity: 4000.0,
            odometer: 12000.0,
            status: VehicleStatus::Available,
            region: Region::West,
            acquisition_cost: Some(2_500_000.0),
        }
    }

    #[test]
    fn test_record_tagging() {
        let record = Record::from(sample_vehicle());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["kind"], "vehicle");
        assert_eq!(json["type"], "Truck");
        assert_eq!(json["status"], "Available");

        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.kind(), EntityKind::Vehicle);
        assert_eq!(parsed.id(), "veh-1");
    }

    #[test]
    fn test_entity_extraction() {
        let record = sample_vehicle().into_record();
        assert!(Driver::from_record(record.clone()).is_none());
        assert_eq!(Vehicle::from_record(record).unwrap().max_capacity, 4000.0);
    }

    #[test]
    fn test_date_order_matches_text_order() {
        let earlier = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
        let later = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        assert!(earlier < later);
        assert!(earlier.to_string() < later.to_string());

        let json = serde_json::to_value(earlier).unwrap();
        assert_eq!(json, "2025-09-30");
    }

    #[test]
    fn test_entity_kind_names() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("truck"), None);
    }

    #[test]
    fn test_new_id_prefix() {
        let id = new_id(EntityKind::Trip);
        assert!(id.starts_with("trp-"));
        assert_eq!(id.len(), 4 + 32);
        assert_ne!(id, new_id(EntityKind::Trip));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(VehicleStatus::OnTrip.to_string(), "On Trip");
        assert_eq!(DriverStatus::OffDuty.to_string(), "Off Duty");
        assert_eq!(MaintenanceStatus::InProgress.to_string(), "In Progress");
    }

    #[test]
    fn test_loose_parsing() {
        assert_eq!("truck".parse::<VehicleType>(), Ok(VehicleType::Truck));
        assert_eq!("On Duty".parse::<DriverStatus>(), Ok(DriverStatus::OnDuty));
        assert_eq!("off_duty".parse::<DriverStatus>(), Ok(DriverStatus::OffDuty));
        assert_eq!(
            VehicleStatus::InShop.to_string().parse::<VehicleStatus>(),
            Ok(VehicleStatus::InShop)
        );
        assert!("hovercraft".parse::<VehicleType>().is_err());
    }
}
