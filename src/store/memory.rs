//! In-process store with serializable units of work.
//!
//! A unit of work holds the store lock for its whole lifetime, works on a copy of the state,
//! and swaps the copy in on commit. The named unique constraints of the SQL schema are
//! checked on every insert so the engine sees the same violations it would see from
//! PostgreSQL.

use super::{YardStore, YardTx};
use crate::error::{
    StoreError, BOOKING_NO_CONSTRAINT, EXIT_LINK_CONSTRAINT, OPEN_IN_CONSTRAINT,
    PENDING_STAGING_CONSTRAINT,
};
use crate::model::{
    BanEntry, BookingAllocation, Client, Direction, HoldEntry, InventoryRecord,
    NewInventoryRecord, StagingDraft, StagingEntry, StagingListRow, StagingQuery, StagingStatus,
    YardUser,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
struct YardState {
    next_inventory_id: i64,
    next_staging_id: i64,
    next_booking_id: i64,
    next_client_id: i64,
    next_user_id: i64,
    bans: BTreeMap<String, String>,
    holds: BTreeMap<String, String>,
    inventory: BTreeMap<i64, InventoryRecord>,
    staging: BTreeMap<i64, StagingEntry>,
    bookings: BTreeMap<i64, BookingAllocation>,
    clients: BTreeMap<i64, Client>,
    users: BTreeMap<i64, YardUser>,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Single-process [`YardStore`].
pub struct MemoryYardStore {
    state: Mutex<YardState>,
    lock_timeout: Duration,
}

impl Default for MemoryYardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryYardStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(5))
    }

    /// Store whose units of work give up after waiting `lock_timeout` for the lock.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(YardState::default()),
            lock_timeout,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, YardState>, StoreError> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.state.try_lock() {
                Ok(guard) => return Ok(guard),
                // State is only replaced on commit, so a poisoned guard still holds the last
                // committed snapshot.
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout(format!(
                            "unit of work not started within {:?}",
                            self.lock_timeout
                        )));
                    }
                    // Parks only the calling coroutine; plain threads fall back to a
                    // thread sleep.
                    may::coroutine::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Register a client in the catalog.
    pub fn add_client(&self, code: &str, name: &str) -> Result<Client, StoreError> {
        let mut state = self.lock()?;
        let client = Client {
            id: next(&mut state.next_client_id),
            code: code.to_string(),
            name: name.to_string(),
        };
        state.clients.insert(client.id, client.clone());
        Ok(client)
    }

    /// Register a yard user in the catalog.
    pub fn add_user(&self, full_name: &str) -> Result<YardUser, StoreError> {
        let mut state = self.lock()?;
        let user = YardUser {
            id: next(&mut state.next_user_id),
            full_name: full_name.to_string(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Every inventory row ever written, in id order.
    pub fn inventory_snapshot(&self) -> Result<Vec<InventoryRecord>, StoreError> {
        Ok(self.lock()?.inventory.values().cloned().collect())
    }

    /// Every staging row, in id order.
    pub fn staging_snapshot(&self) -> Result<Vec<StagingEntry>, StoreError> {
        Ok(self.lock()?.staging.values().cloned().collect())
    }

    pub fn booking_snapshot(&self, id: i64) -> Result<Option<BookingAllocation>, StoreError> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }
}

impl YardStore for MemoryYardStore {
    fn begin(&self) -> Result<Box<dyn YardTx + '_>, StoreError> {
        let guard = self.lock()?;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }
}

struct MemoryTx<'a> {
    guard: MutexGuard<'a, YardState>,
    work: YardState,
}

fn unique_violation(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

impl MemoryTx<'_> {
    fn pending_exists(
        &self,
        container_no: &str,
        direction: Direction,
        exclude_id: Option<i64>,
    ) -> bool {
        self.work.staging.values().any(|s| {
            s.status == StagingStatus::Pending
                && s.direction == direction
                && s.container_no == container_no
                && Some(s.id) != exclude_id
        })
    }
}

impl YardTx for MemoryTx<'_> {
    fn ban_notes(&mut self, container_no: &str) -> Result<Option<String>, StoreError> {
        Ok(self.work.bans.get(container_no).cloned())
    }

    fn hold_notes(&mut self, container_no: &str) -> Result<Option<String>, StoreError> {
        Ok(self.work.holds.get(container_no).cloned())
    }

    fn upsert_ban(&mut self, entry: &BanEntry) -> Result<(), StoreError> {
        self.work
            .bans
            .insert(entry.container_no.clone(), entry.notes.clone());
        Ok(())
    }

    fn remove_ban(&mut self, container_no: &str) -> Result<bool, StoreError> {
        Ok(self.work.bans.remove(container_no).is_some())
    }

    fn upsert_hold(&mut self, entry: &HoldEntry) -> Result<(), StoreError> {
        self.work
            .holds
            .insert(entry.container_no.clone(), entry.notes.clone());
        Ok(())
    }

    fn remove_hold(&mut self, container_no: &str) -> Result<bool, StoreError> {
        Ok(self.work.holds.remove(container_no).is_some())
    }

    fn find_open_in(&mut self, container_no: &str) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self
            .work
            .inventory
            .values()
            .find(|r| r.container_no == container_no && r.is_open_in())
            .cloned())
    }

    fn lock_open_in(&mut self, id: i64) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self
            .work
            .inventory
            .get(&id)
            .filter(|r| r.is_open_in())
            .cloned())
    }

    fn inventory(&mut self, id: i64) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self.work.inventory.get(&id).cloned())
    }

    fn exit_record_for(&mut self, in_id: i64) -> Result<Option<InventoryRecord>, StoreError> {
        Ok(self
            .work
            .inventory
            .values()
            .find(|r| r.exit_link == Some(in_id))
            .cloned())
    }

    fn insert_inventory(
        &mut self,
        record: &NewInventoryRecord,
    ) -> Result<InventoryRecord, StoreError> {
        if record.gate == Direction::In && !record.complete {
            let open = self
                .work
                .inventory
                .values()
                .any(|r| r.container_no == record.container_no && r.is_open_in());
            if open {
                return Err(unique_violation(OPEN_IN_CONSTRAINT));
            }
        }
        if let Some(link) = record.exit_link {
            if self.work.inventory.values().any(|r| r.exit_link == Some(link)) {
                return Err(unique_violation(EXIT_LINK_CONSTRAINT));
            }
            if !self.work.inventory.contains_key(&link) {
                return Err(StoreError::Other(format!(
                    "exit_link references missing inventory row {link}"
                )));
            }
        }

        let id = next(&mut self.work.next_inventory_id);
        let row = record.clone().into_record(id);
        self.work.inventory.insert(id, row.clone());
        Ok(row)
    }

    fn mark_complete(&mut self, id: i64) -> Result<(), StoreError> {
        match self.work.inventory.get_mut(&id) {
            Some(row) => {
                row.complete = true;
                Ok(())
            }
            None => Err(StoreError::Other(format!("inventory row {id} does not exist"))),
        }
    }

    fn list_in_yard(&mut self, client_id: Option<i64>) -> Result<Vec<InventoryRecord>, StoreError> {
        let mut rows: Vec<InventoryRecord> = self
            .work
            .inventory
            .values()
            .filter(|r| r.is_open_in())
            .filter(|r| client_id.is_none() || r.client_id == client_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.entered_at, r.id));
        Ok(rows)
    }

    fn has_pending_staging(
        &mut self,
        container_no: &str,
        direction: Direction,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        Ok(self.pending_exists(container_no, direction, exclude_id))
    }

    fn insert_staging(
        &mut self,
        draft: &StagingDraft,
        created_at: DateTime<Utc>,
    ) -> Result<StagingEntry, StoreError> {
        if draft.direction == Direction::In
            && self.pending_exists(draft.container_no.as_str(), Direction::In, None)
        {
            return Err(unique_violation(PENDING_STAGING_CONSTRAINT));
        }
        let entry = StagingEntry {
            id: next(&mut self.work.next_staging_id),
            client_id: draft.client_id,
            container_no: draft.container_no.to_string(),
            plate_no: draft.plate_no.clone(),
            hauler: draft.hauler.clone(),
            direction: draft.direction,
            created_by: draft.created_by,
            status: StagingStatus::Pending,
            inv_id: None,
            created_at,
            completed_at: None,
            remarks: draft.remarks.clone(),
            detail: draft.detail.clone(),
        };
        self.work.staging.insert(entry.id, entry.clone());
        Ok(entry)
    }

    fn staging(&mut self, id: i64) -> Result<Option<StagingEntry>, StoreError> {
        Ok(self.work.staging.get(&id).cloned())
    }

    fn lock_staging(&mut self, id: i64) -> Result<Option<StagingEntry>, StoreError> {
        self.staging(id)
    }

    fn finish_staging(
        &mut self,
        id: i64,
        inv_id: i64,
        checker_id: Option<i64>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.work.staging.get_mut(&id) {
            Some(entry) if entry.status == StagingStatus::Pending => {
                entry.status = StagingStatus::Finished;
                entry.inv_id = Some(inv_id);
                entry.completed_at = Some(completed_at);
                if checker_id.is_some() {
                    entry.detail.checker_id = checker_id;
                }
                Ok(())
            }
            Some(_) => Err(StoreError::Other(format!("staging entry {id} is not pending"))),
            None => Err(StoreError::Other(format!("staging entry {id} does not exist"))),
        }
    }

    fn delete_pending_staging(&mut self, id: i64) -> Result<u64, StoreError> {
        let pending = self
            .work
            .staging
            .get(&id)
            .is_some_and(|s| s.status == StagingStatus::Pending);
        if pending {
            self.work.staging.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    fn list_staging(
        &mut self,
        query: &StagingQuery,
    ) -> Result<(Vec<StagingListRow>, u64), StoreError> {
        let search = query.search_term();
        let mut matches: Vec<&StagingEntry> = self
            .work
            .staging
            .values()
            .filter(|s| s.direction == query.direction)
            .filter(|s| query.status.map_or(true, |status| s.status == status))
            .filter(|s| query.client_id.is_none() || s.client_id == query.client_id)
            .filter(|s| {
                search.as_deref().map_or(true, |term| {
                    s.container_no.to_ascii_uppercase().contains(term)
                        || s.plate_no.to_ascii_uppercase().contains(term)
                })
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matches.len() as u64;
        let rows = matches
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .map(|entry| {
                let client = entry.client_id.and_then(|id| self.work.clients.get(&id));
                StagingListRow {
                    client_code: client.map(|c| c.code.clone()),
                    client_name: client.map(|c| c.name.clone()),
                    creator_name: self
                        .work
                        .users
                        .get(&entry.created_by)
                        .map(|u| u.full_name.clone()),
                    entry: entry.clone(),
                }
            })
            .collect();
        Ok((rows, total))
    }

    fn insert_booking(
        &mut self,
        booking: &BookingAllocation,
    ) -> Result<BookingAllocation, StoreError> {
        if self
            .work
            .bookings
            .values()
            .any(|b| b.booking_no == booking.booking_no)
        {
            return Err(unique_violation(BOOKING_NO_CONSTRAINT));
        }
        let mut row = booking.clone();
        row.id = next(&mut self.work.next_booking_id);
        self.work.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    fn lock_booking(&mut self, id: i64) -> Result<Option<BookingAllocation>, StoreError> {
        Ok(self.work.bookings.get(&id).cloned())
    }

    fn update_booking_remaining(&mut self, booking: &BookingAllocation) -> Result<(), StoreError> {
        let row = self
            .work
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| StoreError::Other(format!("booking {} does not exist", booking.id)))?;
        let within = |rem: i32, requested: i32| (0..=requested).contains(&rem);
        if !within(booking.twenty_rem, row.twenty)
            || !within(booking.forty_rem, row.forty)
            || !within(booking.forty_five_rem, row.forty_five)
        {
            return Err(StoreError::Other(format!(
                "booking {} remainders out of range",
                booking.booking_no
            )));
        }
        row.twenty_rem = booking.twenty_rem;
        row.forty_rem = booking.forty_rem;
        row.forty_five_rem = booking.forty_five_rem;
        row.cont_list_rem = booking.cont_list_rem.clone();
        row.status = booking.status.clone();
        Ok(())
    }

    fn list_bookings(
        &mut self,
        client_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<Vec<BookingAllocation>, StoreError> {
        Ok(self
            .work
            .bookings
            .values()
            .filter(|b| b.expiration_date >= today)
            .filter(|b| client_id.map_or(true, |id| b.client_id == id))
            .cloned()
            .collect())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
