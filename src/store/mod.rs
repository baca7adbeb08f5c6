//! Storage seam for the gate engine.
//!
//! The engine never talks to a database directly. It opens a unit of work with
//! [`YardStore::begin`], performs reads and writes through [`YardTx`], and commits. Every
//! cross-row invariant is enforced by the store: row locks on the records a transition
//! mutates, and the named unique constraints in [`crate::error`].
//!
//! Dropping a unit of work without calling [`YardTx::commit`] rolls it back, so any early
//! return through `?` leaves no partial state behind.

use crate::error::StoreError;
use crate::model::{
    BanEntry, BookingAllocation, Direction, HoldEntry, InventoryRecord, NewInventoryRecord,
    StagingDraft, StagingEntry, StagingListRow, StagingQuery,
};
use chrono::{DateTime, NaiveDate, Utc};

pub mod memory;
pub mod postgres;

pub use memory::MemoryYardStore;
pub use postgres::PgYardStore;

/// Source of units of work.
pub trait YardStore: Send + Sync {
    /// Open a unit of work. Blocks up to the store's configured timeout.
    fn begin(&self) -> Result<Box<dyn YardTx + '_>, StoreError>;
}

/// A single all-or-nothing unit of work.
pub trait YardTx {
    // Registries

    fn ban_notes(&mut self, container_no: &str) -> Result<Option<String>, StoreError>;
    fn hold_notes(&mut self, container_no: &str) -> Result<Option<String>, StoreError>;
    fn upsert_ban(&mut self, entry: &BanEntry) -> Result<(), StoreError>;
    /// Returns whether a ban was removed.
    fn remove_ban(&mut self, container_no: &str) -> Result<bool, StoreError>;
    fn upsert_hold(&mut self, entry: &HoldEntry) -> Result<(), StoreError>;
    /// Returns whether a hold was removed.
    fn remove_hold(&mut self, container_no: &str) -> Result<bool, StoreError>;

    // Inventory ledger

    /// Open IN record for a container, if any.
    fn find_open_in(&mut self, container_no: &str) -> Result<Option<InventoryRecord>, StoreError>;
    /// Lock inventory row `id` for update if it is still an open IN record.
    fn lock_open_in(&mut self, id: i64) -> Result<Option<InventoryRecord>, StoreError>;
    fn inventory(&mut self, id: i64) -> Result<Option<InventoryRecord>, StoreError>;
    /// OUT record whose `exit_link` is `in_id`.
    fn exit_record_for(&mut self, in_id: i64) -> Result<Option<InventoryRecord>, StoreError>;
    fn insert_inventory(
        &mut self,
        record: &NewInventoryRecord,
    ) -> Result<InventoryRecord, StoreError>;
    /// Set `complete = true` on an IN record.
    fn mark_complete(&mut self, id: i64) -> Result<(), StoreError>;
    /// Open IN records, optionally for one client, oldest first.
    fn list_in_yard(&mut self, client_id: Option<i64>) -> Result<Vec<InventoryRecord>, StoreError>;

    // Staging queue

    /// Whether a pending entry exists for the container and direction, ignoring `exclude_id`.
    fn has_pending_staging(
        &mut self,
        container_no: &str,
        direction: Direction,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError>;
    fn insert_staging(
        &mut self,
        draft: &StagingDraft,
        created_at: DateTime<Utc>,
    ) -> Result<StagingEntry, StoreError>;
    fn staging(&mut self, id: i64) -> Result<Option<StagingEntry>, StoreError>;
    /// Lock staging row `id` for update.
    fn lock_staging(&mut self, id: i64) -> Result<Option<StagingEntry>, StoreError>;
    /// Mark a pending entry finished and link it to its inventory record. A `checker_id`
    /// replaces the recorded checker; `None` leaves it as staged.
    fn finish_staging(
        &mut self,
        id: i64,
        inv_id: i64,
        checker_id: Option<i64>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Delete a pending entry. Returns rows removed.
    fn delete_pending_staging(&mut self, id: i64) -> Result<u64, StoreError>;
    /// One page of staging rows joined with catalog text, plus the total match count.
    fn list_staging(
        &mut self,
        query: &StagingQuery,
    ) -> Result<(Vec<StagingListRow>, u64), StoreError>;

    // Booking ledger

    fn insert_booking(
        &mut self,
        booking: &BookingAllocation,
    ) -> Result<BookingAllocation, StoreError>;
    /// Lock booking row `id` for update, reading its live remainders.
    fn lock_booking(&mut self, id: i64) -> Result<Option<BookingAllocation>, StoreError>;
    /// Persist remainders and status of a locked booking.
    fn update_booking_remaining(&mut self, booking: &BookingAllocation) -> Result<(), StoreError>;
    /// Bookings not expired at `today`, optionally for one client.
    fn list_bookings(
        &mut self,
        client_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<Vec<BookingAllocation>, StoreError>;

    // Unit of work

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
