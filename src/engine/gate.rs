//! Gate-in and gate-out approval.
//!
//! Approval turns a PENDING staging entry into a permanent inventory record inside a single
//! unit of work. The eligibility rules are re-evaluated against current state on every call,
//! so a timed-out approval can simply be retried.
//!
//! Gate-out is split in two. [`GateOutPlan`] is built from a short read that pins the open IN
//! record; the write unit then locks exactly that record and fails with
//! [`GateError::Conflict`] if a concurrent exit closed it in between.

use super::booking::consume_booking_unit;
use super::eligibility::{gate_in_rules, gate_out_rules, hold_rule};
use super::{map_constraint, now, GateContext, GateEngine};
use crate::audit::{ACTION_GATE_IN, ACTION_GATE_OUT};
use crate::error::GateError;
use crate::model::{
    BookingUnit, CheckerDetail, ContainerNo, Direction, InventoryRecord, NewInventoryRecord,
    SizeClass, StagingEntry,
};
use crate::store::{YardStore, YardTx};
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

const MODULE: &str = "gate";

/// The staging entry and the open IN record a gate-out will close.
#[derive(Debug, Clone)]
pub(crate) struct GateOutPlan {
    staging: StagingEntry,
    open_in: InventoryRecord,
}

/// Lock a staging entry for approval in `direction`.
fn lock_pending(
    tx: &mut dyn YardTx,
    staging_id: i64,
    direction: Direction,
) -> Result<StagingEntry, GateError> {
    let entry = tx.lock_staging(staging_id)?.ok_or(GateError::NotFound {
        entity: "staging entry",
        id: staging_id,
    })?;
    if !entry.is_pending() {
        return Err(GateError::AlreadyFinished { staging_id });
    }
    if entry.direction != direction {
        return Err(GateError::ValidationError(format!(
            "staging entry {staging_id} is a {} entry, not {direction}",
            entry.direction
        )));
    }
    Ok(entry)
}

fn staged_container(entry: &StagingEntry) -> Result<ContainerNo, GateError> {
    ContainerNo::parse(&entry.container_no)
}

impl<S: YardStore> GateEngine<S> {
    /// Approve a PENDING gate-in entry. Returns the new IN record.
    ///
    /// `checker` carries the checker's corrections to size, condition, ISO code, and remarks;
    /// unset fields keep the values the guard staged.
    pub fn approve_gate_in(
        &self,
        ctx: &GateContext,
        staging_id: i64,
        checker: &CheckerDetail,
    ) -> Result<InventoryRecord, GateError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::approval_span("IN", staging_id, &ctx.request_id.to_string())
            .entered();

        let start = Instant::now();
        let result = self.try_approve_gate_in(ctx, staging_id, checker);
        #[cfg(feature = "metrics")]
        METRICS.record_approval("IN", start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        self.observe("approve_gate_in", Some(ctx), result)
    }

    fn try_approve_gate_in(
        &self,
        ctx: &GateContext,
        staging_id: i64,
        checker: &CheckerDetail,
    ) -> Result<InventoryRecord, GateError> {
        let mut tx = self.store.begin()?;
        let entry = lock_pending(tx.as_mut(), staging_id, Direction::In)?;
        let container_no = staged_container(&entry)?;

        gate_in_rules(tx.as_mut(), &container_no, Some(entry.id))?;

        let at = now();
        let record = tx
            .insert_inventory(&NewInventoryRecord::gate_in(&entry, checker, ctx.user_id, at))
            .map_err(|e| map_constraint(e, container_no.as_str()))?;
        tx.finish_staging(entry.id, record.id, Some(ctx.user_id), at)?;
        tx.commit()?;

        self.committed(
            ctx,
            ACTION_GATE_IN,
            MODULE,
            Some(record.id),
            format!(
                "Gate-in of {} ({}) on truck {}",
                record.container_no,
                record.size_type.as_deref().unwrap_or("-"),
                record.plate_no
            ),
        );
        Ok(record)
    }

    /// Approve a PENDING gate-out entry, optionally releasing one unit of `booking_id`.
    /// Returns the new OUT record, whose `exit_link` is the closed IN record.
    pub fn approve_gate_out(
        &self,
        ctx: &GateContext,
        staging_id: i64,
        booking_id: Option<i64>,
    ) -> Result<InventoryRecord, GateError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::approval_span("OUT", staging_id, &ctx.request_id.to_string())
            .entered();

        let start = Instant::now();
        let result = self
            .plan_gate_out(staging_id)
            .and_then(|plan| self.commit_gate_out(ctx, plan, booking_id));
        #[cfg(feature = "metrics")]
        METRICS.record_approval("OUT", start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        self.observe("approve_gate_out", Some(ctx), result)
    }

    /// Read the staging entry and run the gate-out rules, pinning the open IN record.
    ///
    /// A pending OUT entry was staged against an open IN record, so finding none now means
    /// another gate-out closed it first and is reported as [`GateError::Conflict`].
    pub(crate) fn plan_gate_out(&self, staging_id: i64) -> Result<GateOutPlan, GateError> {
        let mut tx = self.store.begin()?;
        let staging = lock_pending(tx.as_mut(), staging_id, Direction::Out)?;
        let container_no = staged_container(&staging)?;
        let open_in = gate_out_rules(tx.as_mut(), &container_no).map_err(|e| match e {
            GateError::NotInYard { container_no } => GateError::Conflict(format!(
                "{container_no} left the yard after exit entry {staging_id} was staged"
            )),
            other => other,
        })?;
        tx.rollback()?;
        Ok(GateOutPlan { staging, open_in })
    }

    pub(crate) fn commit_gate_out(
        &self,
        ctx: &GateContext,
        plan: GateOutPlan,
        booking_id: Option<i64>,
    ) -> Result<InventoryRecord, GateError> {
        let mut tx = self.store.begin()?;
        let staging = lock_pending(tx.as_mut(), plan.staging.id, Direction::Out)?;
        let container_no = staging.container_no.as_str();

        let open_in = tx.lock_open_in(plan.open_in.id)?.ok_or_else(|| {
            GateError::Conflict(format!(
                "inventory record {} for {container_no} was closed by a concurrent gate-out",
                plan.open_in.id
            ))
        })?;
        // A hold placed after the plan was read still blocks the exit.
        hold_rule(tx.as_mut(), container_no)?;

        let at = now();
        let record = tx
            .insert_inventory(&NewInventoryRecord::gate_out(
                &open_in,
                &staging,
                booking_id,
                ctx.user_id,
                at,
            ))
            .map_err(|e| map_constraint(e, container_no))?;
        tx.mark_complete(open_in.id)?;

        if let Some(booking_id) = booking_id {
            let unit = BookingUnit {
                container_no: container_no.to_string(),
                size: open_in.size_type.as_deref().and_then(SizeClass::from_size_type),
            };
            let booking = consume_booking_unit(
                tx.as_mut(),
                booking_id,
                &unit,
                open_in.client_id,
                at.date_naive(),
            )?;
            log::debug!(
                "Booking {} released {container_no} (request {})",
                booking.booking_no,
                ctx.request_id
            );
        }

        tx.finish_staging(staging.id, record.id, None, at)?;
        tx.commit()?;

        self.committed(
            ctx,
            ACTION_GATE_OUT,
            MODULE,
            Some(record.id),
            format!(
                "Gate-out of {} on truck {}, closing record {}",
                record.container_no, record.plate_no, open_in.id
            ),
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, AuditEvent, AuditSink, MemoryAuditSink};
    use crate::model::{Condition, GateInDetail, NewStagingEntry};
    use crate::store::MemoryYardStore;
    use std::sync::Arc;

    fn engine() -> GateEngine<MemoryYardStore> {
        GateEngine::new(MemoryYardStore::new(), Arc::new(MemoryAuditSink::new()))
    }

    fn stage(
        engine: &GateEngine<MemoryYardStore>,
        direction: Direction,
        container_no: &str,
    ) -> StagingEntry {
        let detail = match direction {
            Direction::In => GateInDetail {
                size_type: Some("22G1".into()),
                condition: Some(Condition::Empty),
                ..GateInDetail::default()
            },
            Direction::Out => GateInDetail::default(),
        };
        engine
            .create_staging_entry(
                &GateContext::new(1),
                NewStagingEntry {
                    direction,
                    client_id: None,
                    container_no: container_no.to_string(),
                    plate_no: "XYZ-778".into(),
                    hauler: "Portside Trucking".into(),
                    remarks: String::new(),
                    detail,
                },
            )
            .unwrap()
    }

    fn gate_in(engine: &GateEngine<MemoryYardStore>, container_no: &str) -> InventoryRecord {
        let entry = stage(engine, Direction::In, container_no);
        engine
            .approve_gate_in(&GateContext::new(2), entry.id, &CheckerDetail::default())
            .unwrap()
    }

    #[test]
    fn test_gate_in_finishes_staging() {
        let engine = engine();
        let record = gate_in(&engine, "MSCU1234567");
        assert_eq!(record.gate, Direction::In);
        assert!(!record.complete);
        assert_eq!(record.handling_count, 1);
        assert_eq!(record.created_by, 2);

        let staging = engine.store().staging_snapshot().unwrap();
        assert_eq!(staging[0].inv_id, Some(record.id));
        assert!(staging[0].completed_at.is_some());
        assert_eq!(staging[0].detail.checker_id, Some(2));
    }

    #[test]
    fn test_gate_out_keeps_staged_checker() {
        let engine = engine();
        gate_in(&engine, "MSCU1234567");
        let out = stage(&engine, Direction::Out, "MSCU1234567");
        engine
            .approve_gate_out(&GateContext::new(3), out.id, None)
            .unwrap();
        let staging = engine.store().staging_snapshot().unwrap();
        assert_eq!(staging[1].detail.checker_id, None);
    }

    #[test]
    fn test_approving_twice_reports_already_finished() {
        let engine = engine();
        let entry = stage(&engine, Direction::In, "MSCU1234567");
        let ctx = GateContext::new(2);
        engine
            .approve_gate_in(&ctx, entry.id, &CheckerDetail::default())
            .unwrap();
        let err = engine
            .approve_gate_in(&ctx, entry.id, &CheckerDetail::default())
            .unwrap_err();
        assert!(matches!(err, GateError::AlreadyFinished { .. }));
    }

    #[test]
    fn test_gate_in_rejects_ban_added_after_staging() {
        let engine = engine();
        let entry = stage(&engine, Direction::In, "MSCU1234567");
        engine
            .ban(&GateContext::new(9), "MSCU1234567", "flagged by line")
            .unwrap();

        let err = engine
            .approve_gate_in(&GateContext::new(2), entry.id, &CheckerDetail::default())
            .unwrap_err();
        assert!(matches!(err, GateError::Banned { .. }));
        assert!(engine.store().inventory_snapshot().unwrap().is_empty());
        assert!(engine.store().staging_snapshot().unwrap()[0].is_pending());
    }

    #[test]
    fn test_wrong_direction_is_validation_error() {
        let engine = engine();
        gate_in(&engine, "MSCU1234567");
        let out = stage(&engine, Direction::Out, "MSCU1234567");
        let err = engine
            .approve_gate_in(&GateContext::new(2), out.id, &CheckerDetail::default())
            .unwrap_err();
        assert!(matches!(err, GateError::ValidationError(_)));
    }

    #[test]
    fn test_gate_out_links_and_closes() {
        let engine = engine();
        let open_in = gate_in(&engine, "MSCU1234567");
        let out = stage(&engine, Direction::Out, "MSCU1234567");
        let record = engine
            .approve_gate_out(&GateContext::new(3), out.id, None)
            .unwrap();

        assert_eq!(record.gate, Direction::Out);
        assert_eq!(record.exit_link, Some(open_in.id));
        assert_eq!(record.handling_count, 2);
        let rows = engine.store().inventory_snapshot().unwrap();
        assert!(rows.iter().find(|r| r.id == open_in.id).unwrap().complete);
    }

    #[test]
    fn test_commit_with_stale_plan_is_conflict() {
        let engine = engine();
        let open_in = gate_in(&engine, "MSCU1234567");
        let out = stage(&engine, Direction::Out, "MSCU1234567");
        let plan = engine.plan_gate_out(out.id).unwrap();

        // Another instance closes the IN record between plan and commit.
        let mut tx = engine.store().begin().unwrap();
        tx.mark_complete(open_in.id).unwrap();
        tx.commit().unwrap();

        let err = engine
            .commit_gate_out(&GateContext::new(3), plan, None)
            .unwrap_err();
        assert!(matches!(err, GateError::Conflict(_)));
        assert!(err.is_retryable());
        assert_eq!(engine.store().inventory_snapshot().unwrap().len(), 1);
        assert!(engine.store().staging_snapshot().unwrap()[1].is_pending());
    }

    #[test]
    fn test_two_exit_entries_close_the_in_record_once() {
        let engine = engine();
        let open_in = gate_in(&engine, "MSCU1234567");
        let first = stage(&engine, Direction::Out, "MSCU1234567");
        let second = stage(&engine, Direction::Out, "MSCU1234567");

        // Both checkers read the same open IN record before either commits.
        let first_plan = engine.plan_gate_out(first.id).unwrap();
        let second_plan = engine.plan_gate_out(second.id).unwrap();
        assert_eq!(first_plan.open_in.id, second_plan.open_in.id);

        let ctx = GateContext::new(3);
        let record = engine.commit_gate_out(&ctx, first_plan, None).unwrap();
        assert_eq!(record.exit_link, Some(open_in.id));
        let err = engine.commit_gate_out(&ctx, second_plan, None).unwrap_err();
        assert!(matches!(err, GateError::Conflict(_)));

        let rows = engine.store().inventory_snapshot().unwrap();
        assert_eq!(rows.iter().filter(|r| r.exit_link == Some(open_in.id)).count(), 1);
        assert!(engine
            .store()
            .staging_snapshot()
            .unwrap()
            .iter()
            .any(|s| s.id == second.id && s.is_pending()));
    }

    #[test]
    fn test_exit_entry_staged_before_container_left_is_conflict() {
        let engine = engine();
        gate_in(&engine, "MSCU1234567");
        let first = stage(&engine, Direction::Out, "MSCU1234567");
        let second = stage(&engine, Direction::Out, "MSCU1234567");
        let ctx = GateContext::new(3);
        engine.approve_gate_out(&ctx, first.id, None).unwrap();

        let err = engine.approve_gate_out(&ctx, second.id, None).unwrap_err();
        assert!(matches!(err, GateError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_hold_placed_after_plan_blocks_commit() {
        let engine = engine();
        gate_in(&engine, "MSCU1234567");
        let out = stage(&engine, Direction::Out, "MSCU1234567");
        let plan = engine.plan_gate_out(out.id).unwrap();
        engine
            .hold(&GateContext::new(9), "MSCU1234567", "customs exam")
            .unwrap();

        let err = engine
            .commit_gate_out(&GateContext::new(3), plan, None)
            .unwrap_err();
        assert!(matches!(err, GateError::OnHold { .. }));
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn record(&self, _: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError("audit store offline".into()))
        }
    }

    #[test]
    fn test_audit_failure_keeps_committed_gate_in() {
        let engine = GateEngine::new(MemoryYardStore::new(), Arc::new(FailingSink));
        let entry = stage(&engine, Direction::In, "MSCU1234567");
        let record = engine
            .approve_gate_in(&GateContext::new(2), entry.id, &CheckerDetail::default())
            .unwrap();
        let rows = engine.store().inventory_snapshot().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, record.id);
    }
}
