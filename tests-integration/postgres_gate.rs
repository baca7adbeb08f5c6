//! Gate lifecycle against a real PostgreSQL.
//!
//! Racing guards and checkers run as `may` coroutines, each on its own pooled connection, so
//! the row locks and partial unique indexes are what keep the yard consistent.
//!
//! Needs a Docker daemon: `cargo test -p yardgate-integration-tests -- --ignored`

mod common;

use common::{admit, booking, docker, stage, start, PgEngine};
use std::sync::Arc;
use yardgate::executor::query_value;
use yardgate::model::{CheckerDetail, Direction, InventoryRecord};
use yardgate::{GateContext, GateError};

/// Run `racers` coroutines and collect their results in spawn order.
fn race<T, F>(engine: &Arc<PgEngine>, racers: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(&PgEngine, usize) -> T + Send + Sync + Clone + 'static,
{
    let handles: Vec<_> = (0..racers)
        .map(|i| {
            let engine = Arc::clone(engine);
            let f = f.clone();
            may::go!(move || f(&engine, i))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("coroutine panicked"))
        .collect()
}

fn open_in_count(engine: &PgEngine, container_no: &str) -> i64 {
    let conn = engine.store().pool().acquire().unwrap();
    query_value(
        &conn,
        "SELECT COUNT(*) FROM inventory WHERE container_no = $1 AND gate = 'IN' AND NOT complete",
        &[&container_no],
    )
    .unwrap()
}

fn successes(results: &[Result<InventoryRecord, GateError>]) -> usize {
    results.iter().filter(|r| r.is_ok()).count()
}

#[test]
#[ignore = "requires Docker"]
fn test_round_trip_on_postgres() {
    let docker = docker();
    let (_node, engine, audit) = start(&docker);
    let client = engine.store().add_client("ACME", "Acme Lines").unwrap();

    let open_in = admit(&engine, "PGRU1234567", Some(client.id));
    assert!(!engine.check_can_gate_in("PGRU1234567", None).unwrap().ok);

    let out_entry = stage(&engine, Direction::Out, "PGRU1234567", Some(client.id));
    let out = engine
        .approve_gate_out(&GateContext::new(2), out_entry.id, None)
        .unwrap();
    assert_eq!(out.exit_link, Some(open_in.id));
    assert_eq!(out.handling_count, 2);
    assert_eq!(engine.exit_record_for(open_in.id).unwrap(), Some(out));
    assert_eq!(open_in_count(&engine, "PGRU1234567"), 0);
    assert_eq!(audit.events().len(), 4);
}

#[test]
#[ignore = "requires Docker"]
fn test_unique_index_backs_up_gate_in() {
    let docker = docker();
    let (_node, engine, _) = start(&docker);
    let entry = stage(&engine, Direction::In, "IDXU1234567", None);

    let results = race(&engine, 6, move |engine, _| {
        engine.approve_gate_in(&GateContext::new(2), entry.id, &CheckerDetail::default())
    });

    assert_eq!(successes(&results), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, GateError::AlreadyFinished { .. } | GateError::AlreadyInYard { .. }),
            "unexpected {err:?}"
        );
    }
    assert_eq!(open_in_count(&engine, "IDXU1234567"), 1);
}

#[test]
#[ignore = "requires Docker"]
fn test_racing_gate_out_closes_once() {
    let docker = docker();
    let (_node, engine, _) = start(&docker);
    let open_in = admit(&engine, "OUTU1234567", None);
    let exits: Arc<Vec<i64>> = Arc::new(
        (0..2)
            .map(|_| stage(&engine, Direction::Out, "OUTU1234567", None).id)
            .collect(),
    );

    let racers = exits.len();
    let results = race(&engine, racers, move |engine, i| {
        engine.approve_gate_out(&GateContext::new(2), exits[i], None)
    });

    assert_eq!(successes(&results), 1);
    let losers: Vec<&GateError> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(losers.len(), 1);
    assert!(matches!(losers[0], GateError::Conflict(_)), "unexpected {:?}", losers[0]);

    let conn = engine.store().pool().acquire().unwrap();
    let linked: i64 = query_value(
        &conn,
        "SELECT COUNT(*) FROM inventory WHERE exit_link = $1",
        &[&open_in.id],
    )
    .unwrap();
    assert_eq!(linked, 1);
    assert_eq!(open_in_count(&engine, "OUTU1234567"), 0);
}

#[test]
#[ignore = "requires Docker"]
fn test_approving_gate_in_records_checker() {
    let docker = docker();
    let (_node, engine, _) = start(&docker);
    let entry = stage(&engine, Direction::In, "CHKU7654321", None);
    engine
        .approve_gate_in(&GateContext::new(12), entry.id, &CheckerDetail::default())
        .unwrap();

    let conn = engine.store().pool().acquire().unwrap();
    let checker: Option<i64> = query_value(
        &conn,
        "SELECT checker_id FROM staging_entries WHERE id = $1",
        &[&entry.id],
    )
    .unwrap();
    assert_eq!(checker, Some(12));
}

#[test]
#[ignore = "requires Docker"]
fn test_booking_row_lock_serializes_consumption() {
    let docker = docker();
    let (_node, engine, _) = start(&docker);
    let client = engine.store().add_client("SHIP", "Shipper Co").unwrap();
    let created = engine
        .create_booking(&GateContext::new(1), booking("BKG-PG-3", client.id, 3))
        .unwrap();

    let exits: Vec<i64> = (0..6)
        .map(|i| {
            let container_no = format!("PGBU{:07}", 2000 + i);
            admit(&engine, &container_no, Some(client.id));
            stage(&engine, Direction::Out, &container_no, Some(client.id)).id
        })
        .collect();
    let exits = Arc::new(exits);

    let booking_id = created.id;
    let results = race(&engine, exits.len(), move |engine, i| {
        engine.approve_gate_out(&GateContext::new(2), exits[i], Some(booking_id))
    });

    assert_eq!(successes(&results), 3);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, GateError::BookingCapacityExceeded { .. }),
            "unexpected {err:?}"
        );
    }
    let conn = engine.store().pool().acquire().unwrap();
    let remaining: i32 = query_value(
        &conn,
        "SELECT twenty_rem FROM bookings WHERE id = $1",
        &[&booking_id],
    )
    .unwrap();
    assert_eq!(remaining, 0);
    assert_eq!(engine.in_yard(Some(client.id)).unwrap().len(), 3);
}

#[test]
#[ignore = "requires Docker"]
fn test_ban_and_hold_on_postgres() {
    let docker = docker();
    let (_node, engine, _) = start(&docker);
    let ctx = GateContext::new(9);

    engine.ban(&ctx, "BANU7654321", "fumigation required").unwrap();
    let verdict = engine.check_can_gate_in("BANU7654321", None).unwrap();
    assert!(!verdict.ok);
    assert!(verdict.message.contains("fumigation required"));

    admit(&engine, "HLDU7654321", None);
    let out_entry = stage(&engine, Direction::Out, "HLDU7654321", None);
    engine.hold(&ctx, "HLDU7654321", "unpaid storage").unwrap();
    let err = engine
        .approve_gate_out(&GateContext::new(2), out_entry.id, None)
        .unwrap_err();
    assert!(matches!(err, GateError::OnHold { .. }));
}
