//! Gate lifecycle engine.
//!
//! Every operation opens its own unit of work on the [`YardStore`], so the engine is safe to
//! call from any number of threads or coroutines at once; cross-row invariants are left to
//! the store's row locks and unique constraints. Caller identity travels explicitly in a
//! [`GateContext`].
//!
//! - [`eligibility`]: `check_can_gate_in` / `check_can_gate_out`
//! - [`staging`]: create, list, and delete staging entries
//! - [`gate`]: `approve_gate_in` / `approve_gate_out`
//! - [`booking`]: booking creation, listing, and unit consumption
//! - [`registry`]: ban and hold maintenance
//! - [`inventory`]: in-yard listing and exit-record lookup

pub mod booking;
pub mod eligibility;
pub mod gate;
pub mod inventory;
pub mod registry;
pub mod staging;

use crate::audit::{AuditEvent, AuditSink, LogAuditSink};
use crate::error::{
    GateError, StoreError, BOOKING_NO_CONSTRAINT, EXIT_LINK_CONSTRAINT, OPEN_IN_CONSTRAINT,
    PENDING_STAGING_CONSTRAINT,
};
use crate::store::YardStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Who is asking, and which request the call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateContext {
    pub user_id: i64,
    pub request_id: Uuid,
}

impl GateContext {
    /// Context with a fresh v4 request id.
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn with_request_id(user_id: i64, request_id: Uuid) -> Self {
        Self {
            user_id,
            request_id,
        }
    }
}

pub struct GateEngine<S: YardStore> {
    store: S,
    audit: Arc<dyn AuditSink>,
}

impl<S: YardStore> GateEngine<S> {
    pub fn new(store: S, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Engine writing audit events to the log.
    pub fn with_log_audit(store: S) -> Self {
        Self::new(store, Arc::new(LogAuditSink))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a committed transition: metrics, log, audit. Never fails.
    fn committed(
        &self,
        ctx: &GateContext,
        action: &'static str,
        module: &'static str,
        record_id: Option<i64>,
        description: String,
    ) {
        #[cfg(feature = "metrics")]
        METRICS.record_transition(action);

        log::info!(
            "{action} committed (record {record_id:?}, user {}, request {}): {description}",
            ctx.user_id,
            ctx.request_id
        );

        let event = AuditEvent {
            action,
            description,
            module,
            record_id,
            user_id: ctx.user_id,
            request_id: ctx.request_id,
            at: now(),
        };
        if let Err(e) = self.audit.record(&event) {
            log::error!(
                "Audit event {action} for record {record_id:?} (request {}) was not recorded: {e}",
                ctx.request_id
            );
        }
    }

    /// Count and log a failed operation, passing the result through.
    fn observe<T>(
        &self,
        operation: &'static str,
        ctx: Option<&GateContext>,
        result: Result<T, GateError>,
    ) -> Result<T, GateError> {
        if let Err(e) = &result {
            #[cfg(feature = "metrics")]
            METRICS.record_rejection(e.code());

            let request = ctx.map(|c| c.request_id.to_string()).unwrap_or_default();
            match e {
                GateError::Storage(_) => {
                    log::error!("{operation} failed (request {request}): {e}")
                }
                _ => log::warn!("{operation} rejected (request {request}): {e}"),
            }
        }
        result
    }
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Translate a unique violation on one of the named constraints into its domain error.
pub(crate) fn map_constraint(err: StoreError, container_no: &str) -> GateError {
    match err.violated_constraint() {
        Some(OPEN_IN_CONSTRAINT) => GateError::AlreadyInYard {
            container_no: container_no.to_string(),
        },
        Some(PENDING_STAGING_CONSTRAINT) => GateError::DuplicatePending {
            container_no: container_no.to_string(),
        },
        Some(EXIT_LINK_CONSTRAINT) => GateError::Conflict(format!(
            "container {container_no} was gated out by a concurrent request"
        )),
        Some(BOOKING_NO_CONSTRAINT) => {
            GateError::ValidationError("booking number already exists".to_string())
        }
        _ => GateError::Storage(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_constraint_names() {
        let violation = |c: &str| StoreError::UniqueViolation {
            constraint: c.to_string(),
        };
        assert!(matches!(
            map_constraint(violation(OPEN_IN_CONSTRAINT), "MSCU1234567"),
            GateError::AlreadyInYard { .. }
        ));
        assert!(matches!(
            map_constraint(violation(PENDING_STAGING_CONSTRAINT), "MSCU1234567"),
            GateError::DuplicatePending { .. }
        ));
        assert!(matches!(
            map_constraint(violation(EXIT_LINK_CONSTRAINT), "MSCU1234567"),
            GateError::Conflict(_)
        ));
        assert!(matches!(
            map_constraint(violation("some_other_index"), "MSCU1234567"),
            GateError::Storage(_)
        ));
    }

    #[test]
    fn test_context_request_ids_are_unique() {
        let a = GateContext::new(1);
        let b = GateContext::new(1);
        assert_ne!(a.request_id, b.request_id);
    }
}
