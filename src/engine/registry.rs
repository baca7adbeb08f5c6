//! Ban and hold maintenance.
//!
//! The lifecycle rules only read these registries. Writes here take effect for every
//! eligibility check and approval that starts after the commit.

use super::{GateContext, GateEngine};
use crate::audit::{ACTION_BAN, ACTION_HOLD, ACTION_LIFT_BAN, ACTION_RELEASE_HOLD};
use crate::error::GateError;
use crate::model::{BanEntry, ContainerNo, HoldEntry};
use crate::store::YardStore;

const MODULE: &str = "registry";

fn notes_or_default(notes: &str) -> String {
    let notes = notes.trim();
    if notes.is_empty() {
        "no reason given".to_string()
    } else {
        notes.to_string()
    }
}

impl<S: YardStore> GateEngine<S> {
    /// Ban a container from gating in, replacing the notes of an existing ban.
    pub fn ban(
        &self,
        ctx: &GateContext,
        container_no: &str,
        notes: &str,
    ) -> Result<BanEntry, GateError> {
        let result = self.try_ban(ctx, container_no, notes);
        self.observe("ban", Some(ctx), result)
    }

    fn try_ban(
        &self,
        ctx: &GateContext,
        container_no: &str,
        notes: &str,
    ) -> Result<BanEntry, GateError> {
        let entry = BanEntry {
            container_no: ContainerNo::parse(container_no)?.to_string(),
            notes: notes_or_default(notes),
        };
        let mut tx = self.store.begin()?;
        tx.upsert_ban(&entry)?;
        tx.commit()?;

        self.committed(
            ctx,
            ACTION_BAN,
            MODULE,
            None,
            format!("Banned {}: {}", entry.container_no, entry.notes),
        );
        Ok(entry)
    }

    /// Remove a ban. Returns `false` if the container was not banned.
    pub fn lift_ban(&self, ctx: &GateContext, container_no: &str) -> Result<bool, GateError> {
        let result = self.try_lift_ban(ctx, container_no);
        self.observe("lift_ban", Some(ctx), result)
    }

    fn try_lift_ban(&self, ctx: &GateContext, container_no: &str) -> Result<bool, GateError> {
        let container_no = ContainerNo::parse(container_no)?;
        let mut tx = self.store.begin()?;
        let removed = tx.remove_ban(container_no.as_str())?;
        tx.commit()?;

        if removed {
            self.committed(
                ctx,
                ACTION_LIFT_BAN,
                MODULE,
                None,
                format!("Lifted ban on {container_no}"),
            );
        }
        Ok(removed)
    }

    /// Hold a container in the yard, replacing the notes of an existing hold.
    pub fn hold(
        &self,
        ctx: &GateContext,
        container_no: &str,
        notes: &str,
    ) -> Result<HoldEntry, GateError> {
        let result = self.try_hold(ctx, container_no, notes);
        self.observe("hold", Some(ctx), result)
    }

    fn try_hold(
        &self,
        ctx: &GateContext,
        container_no: &str,
        notes: &str,
    ) -> Result<HoldEntry, GateError> {
        let entry = HoldEntry {
            container_no: ContainerNo::parse(container_no)?.to_string(),
            notes: notes_or_default(notes),
        };
        let mut tx = self.store.begin()?;
        tx.upsert_hold(&entry)?;
        tx.commit()?;

        self.committed(
            ctx,
            ACTION_HOLD,
            MODULE,
            None,
            format!("Held {}: {}", entry.container_no, entry.notes),
        );
        Ok(entry)
    }

    /// Release a hold. Returns `false` if the container was not held.
    pub fn release_hold(&self, ctx: &GateContext, container_no: &str) -> Result<bool, GateError> {
        let result = self.try_release_hold(ctx, container_no);
        self.observe("release_hold", Some(ctx), result)
    }

    fn try_release_hold(&self, ctx: &GateContext, container_no: &str) -> Result<bool, GateError> {
        let container_no = ContainerNo::parse(container_no)?;
        let mut tx = self.store.begin()?;
        let removed = tx.remove_hold(container_no.as_str())?;
        tx.commit()?;

        if removed {
            self.committed(
                ctx,
                ACTION_RELEASE_HOLD,
                MODULE,
                None,
                format!("Released hold on {container_no}"),
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::store::MemoryYardStore;
    use std::sync::Arc;

    fn engine() -> (GateEngine<MemoryYardStore>, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        (GateEngine::new(MemoryYardStore::new(), audit.clone()), audit)
    }

    #[test]
    fn test_ban_blocks_gate_in_until_lifted() {
        let (engine, audit) = engine();
        let ctx = GateContext::new(1);
        let entry = engine.ban(&ctx, " mscu1234567 ", "  ").unwrap();
        assert_eq!(entry.container_no, "MSCU1234567");
        assert_eq!(entry.notes, "no reason given");
        assert!(!engine.check_can_gate_in("MSCU1234567", None).unwrap().ok);

        assert!(engine.lift_ban(&ctx, "MSCU1234567").unwrap());
        assert!(!engine.lift_ban(&ctx, "MSCU1234567").unwrap());
        assert!(engine.check_can_gate_in("MSCU1234567", None).unwrap().ok);
        assert_eq!(audit.actions(), vec![ACTION_BAN, ACTION_LIFT_BAN]);
    }

    #[test]
    fn test_hold_replaces_notes() {
        let (engine, audit) = engine();
        let ctx = GateContext::new(1);
        engine.hold(&ctx, "TGHU7654321", "customs").unwrap();
        let entry = engine.hold(&ctx, "TGHU7654321", "unpaid storage").unwrap();
        assert_eq!(entry.notes, "unpaid storage");

        assert!(engine.release_hold(&ctx, "TGHU7654321").unwrap());
        assert_eq!(audit.actions(), vec![ACTION_HOLD, ACTION_HOLD, ACTION_RELEASE_HOLD]);
    }

    #[test]
    fn test_malformed_number_rejected() {
        let (engine, audit) = engine();
        let err = engine.ban(&GateContext::new(1), "BAN-1", "x").unwrap_err();
        assert!(matches!(err, GateError::ValidationError(_)));
        assert!(audit.events().is_empty());
    }
}
