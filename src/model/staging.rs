//! Staging entries (pre-inventory): the guard-created records that precede a gate transition.

use super::container::{Condition, ContainerNo, Direction};
use crate::error::{GateError, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder shown for missing optional text in listings.
pub const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StagingStatus {
    Pending,
    Finished,
}

impl StagingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagingStatus::Pending => "PENDING",
            StagingStatus::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for StagingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StagingStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StagingStatus::Pending),
            "FINISHED" => Ok(StagingStatus::Finished),
            other => Err(StoreError::Parse(format!("unknown staging status '{other}'"))),
        }
    }
}

/// Fields only captured on IN entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateInDetail {
    pub size_type: Option<String>,
    pub condition: Option<Condition>,
    pub iso_code: Option<String>,
    pub manufactured_on: Option<NaiveDate>,
    pub checker_id: Option<i64>,
}

/// A persisted staging entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingEntry {
    pub id: i64,
    pub client_id: Option<i64>,
    pub container_no: String,
    pub plate_no: String,
    pub hauler: String,
    pub direction: Direction,
    pub created_by: i64,
    pub status: StagingStatus,
    pub inv_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub remarks: String,
    pub detail: GateInDetail,
}

impl StagingEntry {
    pub fn is_pending(&self) -> bool {
        self.status == StagingStatus::Pending
    }

    /// Minutes since creation, frozen at completion.
    pub fn runtime_minutes(&self, now: DateTime<Utc>) -> i64 {
        runtime_minutes(self.created_at, self.completed_at, now)
    }
}

/// Guard input for a new staging entry, validated by [`NewStagingEntry::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStagingEntry {
    pub direction: Direction,
    pub client_id: Option<i64>,
    pub container_no: String,
    pub plate_no: String,
    pub hauler: String,
    pub remarks: String,
    pub detail: GateInDetail,
}

/// A staging entry that passed field validation, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDraft {
    pub direction: Direction,
    pub client_id: Option<i64>,
    pub container_no: ContainerNo,
    pub plate_no: String,
    pub hauler: String,
    pub remarks: String,
    pub detail: GateInDetail,
    pub created_by: i64,
}

impl NewStagingEntry {
    pub fn validate(self, created_by: i64) -> Result<StagingDraft, GateError> {
        let container_no = ContainerNo::parse(&self.container_no)?;
        let plate_no = required("plate number", &self.plate_no)?;
        let hauler = required("hauler", &self.hauler)?;

        let mut detail = self.detail;
        match self.direction {
            Direction::In => {
                let size_type = detail
                    .size_type
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        GateError::ValidationError("size/type is required for gate-in".to_string())
                    })?;
                detail.size_type = Some(size_type.to_ascii_uppercase());
                if detail.condition.is_none() {
                    return Err(GateError::ValidationError(
                        "condition is required for gate-in".to_string(),
                    ));
                }
            }
            // IN-only fields are dropped on exit entries.
            Direction::Out => detail = GateInDetail::default(),
        }

        Ok(StagingDraft {
            direction: self.direction,
            client_id: self.client_id,
            container_no,
            plate_no,
            hauler,
            remarks: self.remarks.trim().to_string(),
            detail,
            created_by,
        })
    }
}

fn required(field: &str, value: &str) -> Result<String, GateError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GateError::ValidationError(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// SLA colour band for a staging entry's runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuntimeBand {
    Green,
    Amber,
    Red,
}

impl RuntimeBand {
    pub fn classify(minutes: i64) -> Self {
        if minutes <= 30 {
            RuntimeBand::Green
        } else if minutes <= 60 {
            RuntimeBand::Amber
        } else {
            RuntimeBand::Red
        }
    }
}

/// `completed_at` (or `now` while pending) minus `created_at`, in whole minutes.
pub fn runtime_minutes(
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    let end = completed_at.unwrap_or(now);
    (end - created_at).num_minutes().max(0)
}

/// Text for listings: trimmed value, or [`PLACEHOLDER`] when missing or blank.
pub fn display_or_placeholder(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Filter and pagination for staging listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingQuery {
    pub direction: Direction,
    pub status: Option<StagingStatus>,
    pub client_id: Option<i64>,
    /// Case-insensitive substring match on container or plate number.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl StagingQuery {
    pub const MAX_PER_PAGE: u32 = 200;

    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            status: None,
            client_id: None,
            search: None,
            page: 1,
            per_page: 25,
        }
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page.clamp(1, Self::MAX_PER_PAGE))
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * self.limit()
    }

    /// Upper-cased search term, or `None` when blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_uppercase)
    }
}

/// Staging row as raw storage returns it, with joined catalog text still optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingListRow {
    pub entry: StagingEntry,
    pub client_code: Option<String>,
    pub client_name: Option<String>,
    pub creator_name: Option<String>,
}

/// Read-only projection for guard and checker screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagingView {
    pub id: i64,
    pub direction: Direction,
    pub status: StagingStatus,
    pub container_no: String,
    pub plate_no: String,
    pub hauler: String,
    pub client_code: String,
    pub client_name: String,
    pub created_by: String,
    pub remarks: String,
    pub size_type: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub runtime_minutes: i64,
    pub runtime_band: RuntimeBand,
}

impl StagingView {
    pub fn from_row(row: StagingListRow, now: DateTime<Utc>) -> Self {
        let runtime = row.entry.runtime_minutes(now);
        let entry = row.entry;
        Self {
            id: entry.id,
            direction: entry.direction,
            status: entry.status,
            container_no: display_or_placeholder(Some(&entry.container_no)),
            plate_no: display_or_placeholder(Some(&entry.plate_no)),
            hauler: display_or_placeholder(Some(&entry.hauler)),
            client_code: display_or_placeholder(row.client_code.as_deref()),
            client_name: display_or_placeholder(row.client_name.as_deref()),
            created_by: display_or_placeholder(row.creator_name.as_deref()),
            remarks: display_or_placeholder(Some(&entry.remarks)),
            size_type: display_or_placeholder(entry.detail.size_type.as_deref()),
            created_at: entry.created_at,
            completed_at: entry.completed_at,
            runtime_minutes: runtime,
            runtime_band: RuntimeBand::classify(runtime),
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}
