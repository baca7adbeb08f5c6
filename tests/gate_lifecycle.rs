//! End-to-end gate scenarios against the in-memory store.

mod common;

use common::{admit, engine, stage, twenty_foot_booking, CHECKER, GUARD};
use yardgate::audit::{ACTION_GATE_IN, ACTION_GATE_OUT, ACTION_PRE_IN, ACTION_PRE_OUT};
use yardgate::model::booking::STATUS_CONSUMED;
use yardgate::model::{CheckerDetail, Condition, Direction, StagingQuery, StagingStatus};
use yardgate::{GateContext, GateError};

#[test]
fn test_round_trip_links_out_to_in() {
    let (engine, audit) = engine();
    let open_in = admit(&engine, "ABCD1234567", None);

    let out_entry = stage(&engine, Direction::Out, "ABCD1234567", None);
    let out = engine
        .approve_gate_out(&GateContext::new(CHECKER), out_entry.id, None)
        .unwrap();

    assert_eq!(out.exit_link, Some(open_in.id));
    assert_eq!(out.handling_count, open_in.handling_count + 1);
    let rows = engine.store().inventory_snapshot().unwrap();
    let closed = rows.iter().find(|r| r.id == open_in.id).unwrap();
    assert!(closed.complete);
    assert_eq!(
        audit.actions(),
        vec![ACTION_PRE_IN, ACTION_GATE_IN, ACTION_PRE_OUT, ACTION_GATE_OUT]
    );

    // A new cycle may begin as soon as the container has left.
    assert!(engine.check_can_gate_in("ABCD1234567", None).unwrap().ok);
    admit(&engine, "ABCD1234567", None);
    assert_eq!(engine.in_yard(None).unwrap().len(), 1);
}

#[test]
fn test_gate_in_then_check_reports_already_in_yard() {
    let (engine, _) = engine();
    let verdict = engine.check_can_gate_in("ABCD1234567", Some(5)).unwrap();
    assert!(verdict.ok);

    admit(&engine, "ABCD1234567", Some(5));

    let verdict = engine.check_can_gate_in("ABCD1234567", Some(5)).unwrap();
    assert!(!verdict.ok);
    assert!(verdict.message.contains("already in the yard"));
}

#[test]
fn test_banned_container_never_staged() {
    let (engine, _) = engine();
    engine
        .ban(&GateContext::new(1), "BANU1234567", "reported stolen")
        .unwrap();

    let err = engine
        .create_staging_entry(
            &GateContext::new(GUARD),
            common::staging(Direction::In, "BANU1234567", None),
        )
        .unwrap_err();
    match err {
        GateError::Banned { notes, .. } => assert_eq!(notes, "reported stolen"),
        other => panic!("expected Banned, got {other:?}"),
    }
    assert!(engine.store().staging_snapshot().unwrap().is_empty());
}

#[test]
fn test_held_container_cannot_leave() {
    let (engine, _) = engine();
    admit(&engine, "HLDU1234567", None);
    let out_entry = stage(&engine, Direction::Out, "HLDU1234567", None);
    engine
        .hold(&GateContext::new(1), "HLDU1234567", "awaiting customs release")
        .unwrap();

    let err = engine
        .approve_gate_out(&GateContext::new(CHECKER), out_entry.id, None)
        .unwrap_err();
    assert!(matches!(err, GateError::OnHold { .. }));
    assert!(err.to_string().contains("awaiting customs release"));
    assert_eq!(engine.in_yard(None).unwrap().len(), 1);

    engine
        .release_hold(&GateContext::new(1), "HLDU1234567")
        .unwrap();
    engine
        .approve_gate_out(&GateContext::new(CHECKER), out_entry.id, None)
        .unwrap();
    assert!(engine.in_yard(None).unwrap().is_empty());
}

#[test]
fn test_gate_out_without_gate_in_is_rejected() {
    let (engine, _) = engine();
    let err = engine
        .create_staging_entry(
            &GateContext::new(GUARD),
            common::staging(Direction::Out, "NOPU1234567", None),
        )
        .unwrap_err();
    assert!(matches!(err, GateError::NotInYard { .. }));
}

#[test]
fn test_closing_twice_is_rejected() {
    let (engine, _) = engine();
    admit(&engine, "TWCU1234567", None);
    let out_entry = stage(&engine, Direction::Out, "TWCU1234567", None);
    let ctx = GateContext::new(CHECKER);
    engine.approve_gate_out(&ctx, out_entry.id, None).unwrap();

    let err = engine.approve_gate_out(&ctx, out_entry.id, None).unwrap_err();
    assert!(matches!(err, GateError::AlreadyFinished { .. }));
    let outs = engine
        .store()
        .inventory_snapshot()
        .unwrap()
        .into_iter()
        .filter(|r| r.gate == Direction::Out)
        .count();
    assert_eq!(outs, 1);
}

#[test]
fn test_delete_pending_then_finished() {
    let (engine, _) = engine();
    let ctx = GateContext::new(GUARD);
    let pending = stage(&engine, Direction::In, "DELU1234567", None);
    engine.delete_staging_entry(&ctx, pending.id).unwrap();

    let finished = stage(&engine, Direction::In, "DELU1234567", None);
    engine
        .approve_gate_in(&GateContext::new(CHECKER), finished.id, &CheckerDetail::default())
        .unwrap();
    let err = engine.delete_staging_entry(&ctx, finished.id).unwrap_err();
    assert!(matches!(err, GateError::AlreadyFinished { .. }));
}

#[test]
fn test_checker_corrections_reach_inventory() {
    let (engine, _) = engine();
    let entry = stage(&engine, Direction::In, "CHKU1234567", None);
    let checker = CheckerDetail {
        size_type: Some("45r1".to_string()),
        condition: Some(Condition::Full),
        remarks: Some("dent on left door".to_string()),
        ..CheckerDetail::default()
    };
    let record = engine
        .approve_gate_in(&GateContext::new(CHECKER), entry.id, &checker)
        .unwrap();
    assert_eq!(record.size_type.as_deref(), Some("45R1"));
    assert_eq!(record.condition, Some(Condition::Full));
    assert_eq!(record.remarks, "dent on left door");
    assert_eq!(record.plate_no, entry.plate_no);

    let staged = engine.store().staging_snapshot().unwrap();
    let approved = staged.iter().find(|s| s.id == entry.id).unwrap();
    assert_eq!(approved.detail.checker_id, Some(CHECKER));
    assert_eq!(approved.inv_id, Some(record.id));
}

#[test]
fn test_gate_out_consumes_booking() {
    let (engine, _) = engine();
    let ctx = GateContext::new(CHECKER);
    let booking = engine
        .create_booking(&ctx, twenty_foot_booking("BKG-0001", 5, 1))
        .unwrap();

    admit(&engine, "BKGU1234567", Some(5));
    admit(&engine, "BKGU7654321", Some(5));

    let first = stage(&engine, Direction::Out, "BKGU1234567", Some(5));
    let out = engine
        .approve_gate_out(&ctx, first.id, Some(booking.id))
        .unwrap();
    assert_eq!(out.booking_id, Some(booking.id));

    let after = engine.store().booking_snapshot(booking.id).unwrap().unwrap();
    assert_eq!(after.twenty_rem, 0);
    assert_eq!(after.status, STATUS_CONSUMED);

    // Capacity is gone; the whole gate-out is rolled back.
    let second = stage(&engine, Direction::Out, "BKGU7654321", Some(5));
    let err = engine
        .approve_gate_out(&ctx, second.id, Some(booking.id))
        .unwrap_err();
    assert!(matches!(err, GateError::BookingCapacityExceeded { .. }));
    assert!(err.is_retryable());
    assert_eq!(engine.in_yard(Some(5)).unwrap().len(), 1);
    let staged = engine.store().staging_snapshot().unwrap();
    assert!(staged.iter().find(|s| s.id == second.id).unwrap().is_pending());
}

#[test]
fn test_listing_tracks_status_and_runtime() {
    let (engine, _) = engine();
    let entry = stage(&engine, Direction::In, "LSTU1234567", None);
    stage(&engine, Direction::In, "LSTU7654321", None);
    engine
        .approve_gate_in(&GateContext::new(CHECKER), entry.id, &CheckerDetail::default())
        .unwrap();

    let mut query = StagingQuery::new(Direction::In);
    query.status = Some(StagingStatus::Pending);
    let pending = engine.list_staging(&query).unwrap();
    assert_eq!(pending.total, 1);
    assert_eq!(pending.items[0].container_no, "LSTU7654321");
    assert!(pending.items[0].runtime_minutes >= 0);

    query.status = Some(StagingStatus::Finished);
    let finished = engine.list_staging(&query).unwrap();
    assert_eq!(finished.total, 1);
    assert!(finished.items[0].completed_at.is_some());
}
