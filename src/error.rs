//! Error types for the yard engine.
//!
//! Two layers:
//! - [`StoreError`] is the opaque storage failure (connection loss, lock timeouts, constraint
//!   violations that no domain rule claims). Callers treat it as a generic retryable failure.
//! - [`GateError`] is the user-facing taxonomy returned by every engine operation. Eligibility
//!   failures are ordinary values of this type, never panics.

use may_postgres::error::SqlState;
use may_postgres::Error as PostgresError;
use std::fmt;

/// Partial unique index: at most one open IN record per container number.
pub const OPEN_IN_CONSTRAINT: &str = "uq_inventory_open_in";
/// Partial unique index: an IN record is closed by at most one OUT record.
pub const EXIT_LINK_CONSTRAINT: &str = "uq_inventory_exit_link";
/// Partial unique index: at most one pending staging entry per container and direction.
pub const PENDING_STAGING_CONSTRAINT: &str = "uq_staging_pending";
/// Booking numbers are unique.
pub const BOOKING_NO_CONSTRAINT: &str = "uq_bookings_booking_no";

/// Storage-layer error
#[derive(Debug)]
pub enum StoreError {
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// A unique constraint rejected the write
    UniqueViolation { constraint: String },
    /// No pooled connection became available in time
    PoolTimeout(String),
    /// The unit of work could not acquire its lock in time
    LockTimeout(String),
    /// Unit of work already committed or rolled back
    TransactionClosed,
    /// Connection could not be established
    Connection(String),
    /// Row parsing/conversion error
    Parse(String),
    /// Other storage errors
    Other(String),
}

impl StoreError {
    /// Name of the violated unique constraint, if this is a unique violation.
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint } => Some(constraint.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            StoreError::UniqueViolation { constraint } => {
                write!(f, "Unique constraint violated: {constraint}")
            }
            StoreError::PoolTimeout(s) => write!(f, "Connection pool timeout: {s}"),
            StoreError::LockTimeout(s) => write!(f, "Lock timeout: {s}"),
            StoreError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            StoreError::Connection(s) => write!(f, "Connection error: {s}"),
            StoreError::Parse(s) => write!(f, "Parse error: {s}"),
            StoreError::Other(s) => write!(f, "Storage error: {s}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            if let Some(constraint) = err.as_db_error().and_then(|db| db.constraint()) {
                return StoreError::UniqueViolation {
                    constraint: constraint.to_string(),
                };
            }
        }
        StoreError::Postgres(err)
    }
}

/// Gate lifecycle error taxonomy
#[derive(Debug)]
pub enum GateError {
    /// Container already has an open IN record
    AlreadyInYard { container_no: String },
    /// A pending staging entry already exists for this container and direction
    DuplicatePending { container_no: String },
    /// Container is on the ban list
    Banned { container_no: String, notes: String },
    /// Container has no open IN record
    NotInYard { container_no: String },
    /// Container is on hold
    OnHold { container_no: String, notes: String },
    /// Referenced record does not exist
    NotFound { entity: &'static str, id: i64 },
    /// Staging entry is already finished
    AlreadyFinished { staging_id: i64 },
    /// Lost a race on the open IN record
    Conflict(String),
    /// Booking has no unit available for this container
    BookingCapacityExceeded { booking_no: String, reason: String },
    /// Malformed or missing input
    ValidationError(String),
    /// Opaque storage failure
    Storage(StoreError),
}

impl GateError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            GateError::AlreadyInYard { .. } => "already_in_yard",
            GateError::DuplicatePending { .. } => "duplicate_pending",
            GateError::Banned { .. } => "banned",
            GateError::NotInYard { .. } => "not_in_yard",
            GateError::OnHold { .. } => "on_hold",
            GateError::NotFound { .. } => "not_found",
            GateError::AlreadyFinished { .. } => "already_finished",
            GateError::Conflict(_) => "conflict",
            GateError::BookingCapacityExceeded { .. } => "booking_capacity_exceeded",
            GateError::ValidationError(_) => "validation_error",
            GateError::Storage(_) => "storage_error",
        }
    }

    /// Whether the caller may re-fetch and re-attempt the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GateError::Conflict(_)
                | GateError::BookingCapacityExceeded { .. }
                | GateError::Storage(_)
        )
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::AlreadyInYard { container_no } => {
                write!(f, "Container {container_no} is already in the yard")
            }
            GateError::DuplicatePending { container_no } => {
                write!(f, "Container {container_no} already has a pending gate entry")
            }
            GateError::Banned { container_no, notes } => {
                write!(f, "Container {container_no} is banned: {notes}")
            }
            GateError::NotInYard { container_no } => {
                write!(f, "Container {container_no} is not in the yard")
            }
            GateError::OnHold { container_no, notes } => {
                write!(f, "Container {container_no} is on hold: {notes}")
            }
            GateError::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            GateError::AlreadyFinished { staging_id } => {
                write!(f, "Staging entry {staging_id} is already finished")
            }
            GateError::Conflict(s) => write!(f, "Conflict: {s}"),
            GateError::BookingCapacityExceeded { booking_no, reason } => {
                write!(f, "Booking {booking_no} cannot cover this container: {reason}")
            }
            GateError::ValidationError(s) => write!(f, "Validation error: {s}"),
            GateError::Storage(e) => write!(f, "Storage failure, please retry: {e}"),
        }
    }
}

impl std::error::Error for GateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GateError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for GateError {
    fn from(err: StoreError) -> Self {
        GateError::Storage(err)
    }
}

/// Pre-validation result shown to the guard before a staging entry is created.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Eligibility {
    pub ok: bool,
    pub message: String,
}

impl Eligibility {
    /// Fold a check result into `{ok, message}`.
    ///
    /// Storage failures are not eligibility verdicts and are passed through.
    pub fn from_check(result: Result<(), GateError>) -> Result<Self, GateError> {
        match result {
            Ok(()) => Ok(Self {
                ok: true,
                message: "OK".to_string(),
            }),
            Err(GateError::Storage(e)) => Err(GateError::Storage(e)),
            Err(e) => Ok(Self {
                ok: false,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banned_message_carries_notes() {
        let err = GateError::Banned {
            container_no: "MSCU1234567".to_string(),
            notes: "damaged floor, do not accept".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("MSCU1234567"));
        assert!(display.contains("damaged floor"));
        assert_eq!(err.code(), "banned");
    }

    #[test]
    fn test_retryable_variants() {
        assert!(GateError::Conflict("lost race".into()).is_retryable());
        assert!(GateError::BookingCapacityExceeded {
            booking_no: "BK-1".into(),
            reason: "no 20' units left".into(),
        }
        .is_retryable());
        assert!(GateError::Storage(StoreError::TransactionClosed).is_retryable());

        assert!(!GateError::NotInYard {
            container_no: "MSCU1234567".into()
        }
        .is_retryable());
        assert!(!GateError::ValidationError("bad".into()).is_retryable());
    }

    #[test]
    fn test_unique_violation_constraint_name() {
        let err = StoreError::UniqueViolation {
            constraint: OPEN_IN_CONSTRAINT.to_string(),
        };
        assert_eq!(err.violated_constraint(), Some(OPEN_IN_CONSTRAINT));
        assert_eq!(StoreError::TransactionClosed.violated_constraint(), None);
    }

    #[test]
    fn test_eligibility_from_check() {
        let ok = Eligibility::from_check(Ok(())).unwrap();
        assert!(ok.ok);

        let held = Eligibility::from_check(Err(GateError::OnHold {
            container_no: "TGHU7654321".into(),
            notes: "customs inspection".into(),
        }))
        .unwrap();
        assert!(!held.ok);
        assert!(held.message.contains("customs inspection"));

        let storage = Eligibility::from_check(Err(GateError::Storage(StoreError::Other(
            "connection reset".into(),
        ))));
        assert!(storage.is_err());
    }
}
