//! Core error types.

use crate::record::{EntityKind, VehicleType};
use chrono::NaiveDate;
use thiserror::Error;

/// Why a driver's license does not cover a vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseProblem {
    /// The license expired before today.
    Expired { expiry: NaiveDate },
    /// The license does not list the vehicle's category.
    MissingCategory,
}

impl std::fmt::Display for LicenseProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LicenseProblem::Expired { expiry } => write!(f, "license expired on {}", expiry),
            LicenseProblem::MissingCategory => f.write_str("category not on license"),
        }
    }
}

/// Errors from the fleet lifecycle engine.
///
/// All of these are detected before anything is written, so the store is
/// never left partially updated.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("invalid transition: cannot {action} {kind} {id} in state '{state}'")]
    InvalidTransition {
        kind: EntityKind,
        id: String,
        state: String,
        action: &'static str,
    },

    #[error("{kind} {id} is not available (status '{status}')")]
    Unavailable {
        kind: EntityKind,
        id: String,
        status: String,
    },

    #[error("cargo weight ({weight}kg) exceeds vehicle capacity ({limit}kg)")]
    CapacityExceeded { weight: f64, limit: f64 },

    #[error("driver {driver_id} license is invalid for {vehicle_type} category: {problem}")]
    LicenseInvalid {
        driver_id: String,
        vehicle_type: VehicleType,
        problem: LicenseProblem,
    },

    #[error("end odometer {end} is below start odometer {start}")]
    OdometerRegression { start: f64, end: f64 },

    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("store error: {reason}")]
    Store { reason: String },
}

impl CoreError {
    pub(crate) fn not_found(kind: EntityKind, id: &str) -> Self {
        CoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        CoreError::Validation {
            reason: reason.into(),
        }
    }

    /// Returns whether this error indicates the operation can be retried.
    ///
    /// Everything except a store failure describes invalid input or an
    /// illegal state and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Store { .. })
    }

    /// Returns an error code suitable for transport responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::Unavailable { .. } => "UNAVAILABLE",
            CoreError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            CoreError::LicenseInvalid { .. } => "LICENSE_INVALID",
            CoreError::OdometerRegression { .. } => "ODOMETER_REGRESSION",
            CoreError::Validation { .. } => "BAD_REQUEST",
            CoreError::Store { .. } => "STORE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::CapacityExceeded {
            weight: 4500.0,
            limit: 4000.0,
        };
        assert_eq!(
            err.to_string(),
            "cargo weight (4500kg) exceeds vehicle capacity (4000kg)"
        );

        let err = CoreError::LicenseInvalid {
            driver_id: "drv-1".to_string(),
            vehicle_type: VehicleType::Truck,
            problem: LicenseProblem::Expired {
                expiry: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            },
        };
        assert_eq!(
            err.to_string(),
            "driver drv-1 license is invalid for Truck category: license expired on 2024-01-31"
        );

        let err = CoreError::InvalidTransition {
            kind: EntityKind::Trip,
            id: "trp-1".to_string(),
            state: "Draft".to_string(),
            action: "complete",
        };
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot complete trip trp-1 in state 'Draft'"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CoreError::not_found(EntityKind::Vehicle, "v").error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            CoreError::OdometerRegression {
                start: 10.0,
                end: 5.0
            }
            .error_code(),
            "ODOMETER_REGRESSION"
        );
        assert_eq!(CoreError::validation("x").error_code(), "BAD_REQUEST");
    }

    #[test]
    fn test_only_store_errors_retry() {
        assert!(CoreError::Store {
            reason: "disk full".to_string()
        }
        .is_retryable());
        assert!(!CoreError::CapacityExceeded {
            weight: 2.0,
            limit: 1.0
        }
        .is_retryable());
    }
}
