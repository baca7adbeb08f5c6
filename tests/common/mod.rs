//! Shared fixtures for the scenario and concurrency suites.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use fake::faker::company::en::CompanyName;
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use std::sync::Arc;
use yardgate::model::{
    CheckerDetail, Condition, Direction, GateInDetail, InventoryRecord, NewBooking,
    NewStagingEntry, StagingEntry,
};
use yardgate::{GateContext, GateEngine, MemoryAuditSink, MemoryYardStore};

pub type Engine = GateEngine<MemoryYardStore>;

pub const GUARD: i64 = 11;
pub const CHECKER: i64 = 12;

pub fn engine() -> (Arc<Engine>, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let engine = GateEngine::new(MemoryYardStore::new(), audit.clone());
    (Arc::new(engine), audit)
}

pub fn plate() -> String {
    format!("TRK-{}", (1000..9999).fake::<u32>())
}

pub fn staging(
    direction: Direction,
    container_no: &str,
    client_id: Option<i64>,
) -> NewStagingEntry {
    let detail = match direction {
        Direction::In => GateInDetail {
            size_type: Some("22G1".to_string()),
            condition: Some(Condition::Empty),
            ..GateInDetail::default()
        },
        Direction::Out => GateInDetail::default(),
    };
    NewStagingEntry {
        direction,
        client_id,
        container_no: container_no.to_string(),
        plate_no: plate(),
        hauler: CompanyName().fake(),
        remarks: Sentence(3..6).fake(),
        detail,
    }
}

pub fn stage(
    engine: &Engine,
    direction: Direction,
    container_no: &str,
    client_id: Option<i64>,
) -> StagingEntry {
    engine
        .create_staging_entry(&GateContext::new(GUARD), staging(direction, container_no, client_id))
        .unwrap()
}

/// Stage and approve a gate-in.
pub fn admit(engine: &Engine, container_no: &str, client_id: Option<i64>) -> InventoryRecord {
    let entry = stage(engine, Direction::In, container_no, client_id);
    engine
        .approve_gate_in(&GateContext::new(CHECKER), entry.id, &CheckerDetail::default())
        .unwrap()
}

pub fn twenty_foot_booking(booking_no: &str, client_id: i64, twenty: i32) -> NewBooking {
    NewBooking {
        booking_no: booking_no.to_string(),
        client_id,
        shipper: CompanyName().fake(),
        twenty,
        forty: 0,
        forty_five: 0,
        cont_list: String::new(),
        expiration_date: Utc::now().date_naive() + Duration::days(14),
    }
}
