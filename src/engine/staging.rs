//! Staging queue: guard-created entries waiting for checker approval.

use super::eligibility::{gate_in_rules, gate_out_rules};
use super::{map_constraint, now, GateContext, GateEngine};
use crate::audit::{ACTION_DELETE_STAGING, ACTION_PRE_IN, ACTION_PRE_OUT};
use crate::error::GateError;
use crate::model::{Direction, NewStagingEntry, Page, StagingEntry, StagingQuery, StagingView};
use crate::store::YardStore;

const MODULE: &str = "staging";

impl<S: YardStore> GateEngine<S> {
    /// Validate, run the direction's eligibility rules, and insert a PENDING entry.
    ///
    /// Never writes an inventory record. A rejected entry leaves nothing behind.
    pub fn create_staging_entry(
        &self,
        ctx: &GateContext,
        input: NewStagingEntry,
    ) -> Result<StagingEntry, GateError> {
        let result = self.try_create_staging_entry(ctx, input);
        self.observe("create_staging_entry", Some(ctx), result)
    }

    fn try_create_staging_entry(
        &self,
        ctx: &GateContext,
        input: NewStagingEntry,
    ) -> Result<StagingEntry, GateError> {
        let draft = input.validate(ctx.user_id)?;
        let container_no = draft.container_no.as_str();

        let mut tx = self.store.begin()?;
        match draft.direction {
            Direction::In => gate_in_rules(tx.as_mut(), &draft.container_no, None)?,
            Direction::Out => {
                gate_out_rules(tx.as_mut(), &draft.container_no)?;
            }
        }
        let entry = tx
            .insert_staging(&draft, now())
            .map_err(|e| map_constraint(e, container_no))?;
        tx.commit()?;

        let action = match entry.direction {
            Direction::In => ACTION_PRE_IN,
            Direction::Out => ACTION_PRE_OUT,
        };
        self.committed(
            ctx,
            action,
            MODULE,
            Some(entry.id),
            format!(
                "Staged {} of {} on truck {}",
                entry.direction, entry.container_no, entry.plate_no
            ),
        );
        Ok(entry)
    }

    /// One page of staging rows with catalog text resolved and SLA runtime attached.
    pub fn list_staging(&self, query: &StagingQuery) -> Result<Page<StagingView>, GateError> {
        let result = self.try_list_staging(query);
        self.observe("list_staging", None, result)
    }

    fn try_list_staging(&self, query: &StagingQuery) -> Result<Page<StagingView>, GateError> {
        let mut tx = self.store.begin()?;
        let (rows, total) = tx.list_staging(query)?;
        tx.rollback()?;

        let at = now();
        Ok(Page {
            items: rows
                .into_iter()
                .map(|row| StagingView::from_row(row, at))
                .collect(),
            total,
            page: query.page.max(1),
            per_page: query.limit() as u32,
        })
    }

    /// Delete a PENDING entry. Finished entries are history and stay.
    pub fn delete_staging_entry(
        &self,
        ctx: &GateContext,
        staging_id: i64,
    ) -> Result<(), GateError> {
        let result = self.try_delete_staging_entry(ctx, staging_id);
        self.observe("delete_staging_entry", Some(ctx), result)
    }

    fn try_delete_staging_entry(
        &self,
        ctx: &GateContext,
        staging_id: i64,
    ) -> Result<(), GateError> {
        let mut tx = self.store.begin()?;
        let entry = tx.lock_staging(staging_id)?.ok_or(GateError::NotFound {
            entity: "staging entry",
            id: staging_id,
        })?;
        if !entry.is_pending() {
            return Err(GateError::AlreadyFinished { staging_id });
        }
        if tx.delete_pending_staging(staging_id)? == 0 {
            return Err(GateError::AlreadyFinished { staging_id });
        }
        tx.commit()?;

        self.committed(
            ctx,
            ACTION_DELETE_STAGING,
            MODULE,
            Some(staging_id),
            format!("Deleted pending {} entry for {}", entry.direction, entry.container_no),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::model::staging::PLACEHOLDER;
    use crate::model::{CheckerDetail, Condition, GateInDetail, RuntimeBand, StagingStatus};
    use crate::store::{MemoryYardStore, YardTx};
    use std::sync::Arc;

    fn engine() -> (GateEngine<MemoryYardStore>, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        (GateEngine::new(MemoryYardStore::new(), audit.clone()), audit)
    }

    fn pre_in(container_no: &str) -> NewStagingEntry {
        NewStagingEntry {
            direction: Direction::In,
            client_id: None,
            container_no: container_no.to_string(),
            plate_no: "TRK-204".into(),
            hauler: "Harbor Line".into(),
            remarks: String::new(),
            detail: GateInDetail {
                size_type: Some("45g1".into()),
                condition: Some(Condition::Empty),
                ..GateInDetail::default()
            },
        }
    }

    #[test]
    fn test_create_pending_entry_and_audit() {
        let (engine, audit) = engine();
        let ctx = GateContext::new(4);
        let entry = engine.create_staging_entry(&ctx, pre_in("mscu1234567")).unwrap();

        assert_eq!(entry.container_no, "MSCU1234567");
        assert_eq!(entry.status, StagingStatus::Pending);
        assert_eq!(entry.created_by, 4);
        assert_eq!(entry.completed_at, None);
        assert_eq!(entry.detail.size_type.as_deref(), Some("45G1"));
        assert_eq!(audit.actions(), vec![ACTION_PRE_IN]);
        assert!(engine.store().inventory_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_second_pending_entry_rejected() {
        let (engine, audit) = engine();
        let ctx = GateContext::new(1);
        engine.create_staging_entry(&ctx, pre_in("MSCU1234567")).unwrap();
        let err = engine
            .create_staging_entry(&ctx, pre_in("MSCU1234567"))
            .unwrap_err();
        assert!(matches!(err, GateError::DuplicatePending { .. }));
        assert_eq!(audit.events().len(), 1);
    }

    #[test]
    fn test_exit_may_be_staged_twice() {
        let (engine, audit) = engine();
        let ctx = GateContext::new(1);
        let entry = engine.create_staging_entry(&ctx, pre_in("MSCU1234567")).unwrap();
        engine
            .approve_gate_in(&GateContext::new(2), entry.id, &CheckerDetail::default())
            .unwrap();

        let mut exit = pre_in("MSCU1234567");
        exit.direction = Direction::Out;
        let first = engine.create_staging_entry(&ctx, exit.clone()).unwrap();
        let second = engine.create_staging_entry(&ctx, exit).unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.is_pending() && second.is_pending());
        assert_eq!(audit.actions().iter().filter(|a| *a == ACTION_PRE_OUT).count(), 2);
    }

    #[test]
    fn test_pre_out_requires_container_in_yard() {
        let (engine, _) = engine();
        let mut input = pre_in("MSCU1234567");
        input.direction = Direction::Out;
        let err = engine
            .create_staging_entry(&GateContext::new(1), input)
            .unwrap_err();
        assert!(matches!(err, GateError::NotInYard { .. }));
        assert!(engine.store().staging_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_delete_pending_then_missing() {
        let (engine, audit) = engine();
        let ctx = GateContext::new(1);
        let entry = engine.create_staging_entry(&ctx, pre_in("MSCU1234567")).unwrap();
        engine.delete_staging_entry(&ctx, entry.id).unwrap();
        assert_eq!(audit.actions(), vec![ACTION_PRE_IN, ACTION_DELETE_STAGING]);

        let err = engine.delete_staging_entry(&ctx, entry.id).unwrap_err();
        assert!(matches!(err, GateError::NotFound { .. }));
    }

    #[test]
    fn test_list_staging_placeholders_and_band() {
        let (engine, _) = engine();
        let user = engine.store().add_user("Guard Ana").unwrap();
        let ctx = GateContext::new(user.id);
        engine.create_staging_entry(&ctx, pre_in("MSCU1234567")).unwrap();
        engine.create_staging_entry(&ctx, pre_in("TGHU7654321")).unwrap();

        let mut query = StagingQuery::new(Direction::In);
        query.search = Some("tghu".into());
        let page = engine.list_staging(&query).unwrap();
        assert_eq!(page.total, 1);
        let view = &page.items[0];
        assert_eq!(view.container_no, "TGHU7654321");
        assert_eq!(view.client_code, PLACEHOLDER);
        assert_eq!(view.created_by, "Guard Ana");
        assert_eq!(view.runtime_band, RuntimeBand::Green);

        let mut tx = engine.store().begin().unwrap();
        assert!(tx.staging(view.id).unwrap().is_some());
    }
}
