//! Inventory ledger rows.
//!
//! IN rows are never deleted; they are closed by a fresh OUT row whose `exit_link` points back
//! at them. A container is in the yard exactly when it has an IN row with `complete = false`.

use super::container::{Condition, Direction};
use super::staging::StagingEntry;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: i64,
    pub container_no: String,
    pub client_id: Option<i64>,
    pub size_type: Option<String>,
    pub condition: Option<Condition>,
    pub iso_code: Option<String>,
    pub manufactured_on: Option<NaiveDate>,
    pub plate_no: String,
    pub hauler: String,
    pub entered_at: DateTime<Utc>,
    pub gate: Direction,
    pub handling_count: i32,
    pub complete: bool,
    pub remarks: String,
    pub exit_link: Option<i64>,
    pub booking_id: Option<i64>,
    pub created_by: i64,
}

impl InventoryRecord {
    /// Open IN row: the container is currently in the yard.
    pub fn is_open_in(&self) -> bool {
        self.gate == Direction::In && !self.complete
    }
}

/// Checker-supplied corrections applied when a gate-in is approved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckerDetail {
    pub size_type: Option<String>,
    pub condition: Option<Condition>,
    pub iso_code: Option<String>,
    pub manufactured_on: Option<NaiveDate>,
    pub remarks: Option<String>,
}

/// Row to insert into the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInventoryRecord {
    pub container_no: String,
    pub client_id: Option<i64>,
    pub size_type: Option<String>,
    pub condition: Option<Condition>,
    pub iso_code: Option<String>,
    pub manufactured_on: Option<NaiveDate>,
    pub plate_no: String,
    pub hauler: String,
    pub entered_at: DateTime<Utc>,
    pub gate: Direction,
    pub handling_count: i32,
    pub complete: bool,
    pub remarks: String,
    pub exit_link: Option<i64>,
    pub booking_id: Option<i64>,
    pub created_by: i64,
}

impl NewInventoryRecord {
    /// IN row built from an approved staging entry plus the checker's corrections.
    pub fn gate_in(
        staging: &StagingEntry,
        checker: &CheckerDetail,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let remarks = checker
            .remarks
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| staging.remarks.clone());

        Self {
            container_no: staging.container_no.clone(),
            client_id: staging.client_id,
            size_type: checker
                .size_type
                .as_deref()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .or_else(|| staging.detail.size_type.clone()),
            condition: checker.condition.or(staging.detail.condition),
            iso_code: checker.iso_code.clone().or_else(|| staging.detail.iso_code.clone()),
            manufactured_on: checker.manufactured_on.or(staging.detail.manufactured_on),
            plate_no: staging.plate_no.clone(),
            hauler: staging.hauler.clone(),
            entered_at: now,
            gate: Direction::In,
            handling_count: 1,
            complete: false,
            remarks,
            exit_link: None,
            booking_id: None,
            created_by: user_id,
        }
    }

    /// OUT row closing `open_in`. OUT rows are terminal, so they are written complete.
    pub fn gate_out(
        open_in: &InventoryRecord,
        staging: &StagingEntry,
        booking_id: Option<i64>,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            container_no: open_in.container_no.clone(),
            client_id: open_in.client_id.or(staging.client_id),
            size_type: open_in.size_type.clone(),
            condition: open_in.condition,
            iso_code: open_in.iso_code.clone(),
            manufactured_on: open_in.manufactured_on,
            plate_no: staging.plate_no.clone(),
            hauler: staging.hauler.clone(),
            entered_at: now,
            gate: Direction::Out,
            handling_count: open_in.handling_count + 1,
            complete: true,
            remarks: staging.remarks.clone(),
            exit_link: Some(open_in.id),
            booking_id,
            created_by: user_id,
        }
    }

    pub fn into_record(self, id: i64) -> InventoryRecord {
        InventoryRecord {
            id,
            container_no: self.container_no,
            client_id: self.client_id,
            size_type: self.size_type,
            condition: self.condition,
            iso_code: self.iso_code,
            manufactured_on: self.manufactured_on,
            plate_no: self.plate_no,
            hauler: self.hauler,
            entered_at: self.entered_at,
            gate: self.gate,
            handling_count: self.handling_count,
            complete: self.complete,
            remarks: self.remarks,
            exit_link: self.exit_link,
            booking_id: self.booking_id,
            created_by: self.created_by,
        }
    }
}
