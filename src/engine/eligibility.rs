//! Gate-in and gate-out eligibility rules.
//!
//! The rules run in a fixed order so the most actionable rejection wins: an open IN record is
//! reported before a pending entry, and both before a ban.

use super::GateEngine;
use crate::error::{Eligibility, GateError};
use crate::model::{ContainerNo, Direction, InventoryRecord};
use crate::store::{YardStore, YardTx};

/// Gate-in rules. `exclude_staging` skips the entry being approved in the pending check.
pub(crate) fn gate_in_rules(
    tx: &mut dyn YardTx,
    container_no: &ContainerNo,
    exclude_staging: Option<i64>,
) -> Result<(), GateError> {
    let number = container_no.as_str();
    if tx.find_open_in(number)?.is_some() {
        return Err(GateError::AlreadyInYard {
            container_no: number.to_string(),
        });
    }
    if tx.has_pending_staging(number, Direction::In, exclude_staging)? {
        return Err(GateError::DuplicatePending {
            container_no: number.to_string(),
        });
    }
    if let Some(notes) = tx.ban_notes(number)? {
        return Err(GateError::Banned {
            container_no: number.to_string(),
            notes,
        });
    }
    Ok(())
}

/// Gate-out rules. Returns the open IN record the exit will close.
pub(crate) fn gate_out_rules(
    tx: &mut dyn YardTx,
    container_no: &ContainerNo,
) -> Result<InventoryRecord, GateError> {
    let number = container_no.as_str();
    let open_in = tx
        .find_open_in(number)?
        .ok_or_else(|| GateError::NotInYard {
            container_no: number.to_string(),
        })?;
    hold_rule(tx, number)?;
    Ok(open_in)
}

pub(crate) fn hold_rule(tx: &mut dyn YardTx, container_no: &str) -> Result<(), GateError> {
    match tx.hold_notes(container_no)? {
        Some(notes) => Err(GateError::OnHold {
            container_no: container_no.to_string(),
            notes,
        }),
        None => Ok(()),
    }
}

impl<S: YardStore> GateEngine<S> {
    /// UI pre-validation for a gate-in. `client_id` is informational only.
    pub fn check_can_gate_in(
        &self,
        container_no: &str,
        client_id: Option<i64>,
    ) -> Result<Eligibility, GateError> {
        log::debug!("Checking gate-in eligibility of {container_no} for client {client_id:?}");
        let result = ContainerNo::parse(container_no).and_then(|container_no| {
            let mut tx = self.store.begin()?;
            gate_in_rules(tx.as_mut(), &container_no, None)
        });
        Eligibility::from_check(result)
    }

    /// UI pre-validation for a gate-out.
    pub fn check_can_gate_out(&self, container_no: &str) -> Result<Eligibility, GateError> {
        let result = ContainerNo::parse(container_no).and_then(|container_no| {
            let mut tx = self.store.begin()?;
            gate_out_rules(tx.as_mut(), &container_no).map(|_| ())
        });
        Eligibility::from_check(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::model::{BanEntry, Condition, HoldEntry, NewInventoryRecord};
    use crate::store::MemoryYardStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn engine() -> GateEngine<MemoryYardStore> {
        GateEngine::new(MemoryYardStore::new(), Arc::new(MemoryAuditSink::new()))
    }

    fn seed_open_in(store: &MemoryYardStore, container_no: &str) {
        let mut tx = store.begin().unwrap();
        tx.insert_inventory(&NewInventoryRecord {
            container_no: container_no.to_string(),
            client_id: None,
            size_type: Some("22G1".into()),
            condition: Some(Condition::Full),
            iso_code: None,
            manufactured_on: None,
            plate_no: "ABC-123".into(),
            hauler: "North Haulage".into(),
            entered_at: Utc::now(),
            gate: Direction::In,
            handling_count: 1,
            complete: false,
            remarks: String::new(),
            exit_link: None,
            booking_id: None,
            created_by: 1,
        })
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_gate_in_ok_for_unknown_container() {
        let engine = engine();
        let result = engine.check_can_gate_in("ABCD1234567", Some(5)).unwrap();
        assert!(result.ok);
        assert_eq!(result.message, "OK");
    }

    #[test]
    fn test_in_yard_reported_before_ban() {
        let engine = engine();
        seed_open_in(engine.store(), "ABCD1234567");
        let mut tx = engine.store().begin().unwrap();
        tx.upsert_ban(&BanEntry {
            container_no: "ABCD1234567".into(),
            notes: "structural damage".into(),
        })
        .unwrap();
        tx.commit().unwrap();

        let result = engine.check_can_gate_in("ABCD1234567", None).unwrap();
        assert!(!result.ok);
        assert!(result.message.contains("already in the yard"), "{}", result.message);
    }

    #[test]
    fn test_ban_message_includes_notes() {
        let engine = engine();
        let mut tx = engine.store().begin().unwrap();
        tx.upsert_ban(&BanEntry {
            container_no: "BANU0000001".into(),
            notes: "owner dispute".into(),
        })
        .unwrap();
        tx.commit().unwrap();

        let result = engine.check_can_gate_in("banu0000001", None).unwrap();
        assert!(!result.ok);
        assert!(result.message.contains("owner dispute"));
    }

    #[test]
    fn test_gate_out_requires_open_in_then_hold() {
        let engine = engine();
        let result = engine.check_can_gate_out("HLDU0000001").unwrap();
        assert!(result.message.contains("not in the yard"));

        seed_open_in(engine.store(), "HLDU0000001");
        let mut tx = engine.store().begin().unwrap();
        tx.upsert_hold(&HoldEntry {
            container_no: "HLDU0000001".into(),
            notes: "customs".into(),
        })
        .unwrap();
        tx.commit().unwrap();

        let result = engine.check_can_gate_out("HLDU0000001").unwrap();
        assert!(!result.ok);
        assert!(result.message.contains("customs"));
    }

    #[test]
    fn test_malformed_number_is_not_eligible() {
        let engine = engine();
        let result = engine.check_can_gate_in("BANXXXXXXX", None).unwrap();
        assert!(!result.ok);
        assert!(result.message.contains("Validation error"));
    }
}
