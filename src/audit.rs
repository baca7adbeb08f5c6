//! Audit events emitted after committed transitions.
//!
//! Sinks are fire-and-forget from the engine's point of view: an event is recorded after the
//! unit of work commits, and a failing sink is logged at error level without touching the
//! committed state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

pub const ACTION_PRE_IN: &str = "PRE-IN";
pub const ACTION_PRE_OUT: &str = "PRE-OUT";
pub const ACTION_GATE_IN: &str = "GATE-IN";
pub const ACTION_GATE_OUT: &str = "GATE-OUT";
pub const ACTION_DELETE_STAGING: &str = "DELETE-STAGING";
pub const ACTION_BOOKING: &str = "BOOKING";
pub const ACTION_BAN: &str = "BAN";
pub const ACTION_LIFT_BAN: &str = "LIFT-BAN";
pub const ACTION_HOLD: &str = "HOLD";
pub const ACTION_RELEASE_HOLD: &str = "RELEASE-HOLD";

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: &'static str,
    pub description: String,
    pub module: &'static str,
    pub record_id: Option<i64>,
    pub user_id: i64,
    pub request_id: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AuditError(pub String);

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Audit sink error: {}", self.0)
    }
}

impl std::error::Error for AuditError {}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes each event as one JSON line on the `yardgate::audit` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let line = serde_json::to_string(event).map_err(|e| AuditError(e.to_string()))?;
        log::info!(target: "yardgate::audit", "{line}");
        Ok(())
    }
}

/// Keeps events in memory. Useful for tests and for embedding behind a batch writer.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|_| AuditError("audit buffer poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}
