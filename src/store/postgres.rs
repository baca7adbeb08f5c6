//! PostgreSQL-backed [`YardStore`].
//!
//! Each unit of work is a [`Transaction`] on a pooled connection. Rows a transition mutates
//! are read with `SELECT ... FOR UPDATE`; the partial unique indexes created by
//! [`crate::migration::CreateYardSchema`] reject whatever a lost race would otherwise write.

use super::{YardStore, YardTx};
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::executor::SqlExecutor;
use crate::model::booking::{join_list, split_list};
use crate::model::{
    BanEntry, BookingAllocation, Client, Condition, Direction, GateInDetail, HoldEntry,
    InventoryRecord, NewInventoryRecord, StagingDraft, StagingEntry, StagingListRow, StagingQuery,
    StagingStatus, YardUser,
};
use crate::pool::PgPool;
use crate::transaction::{IsolationLevel, Transaction};
use crate::value_conversion::with_converted_params;
use chrono::{DateTime, NaiveDate, Utc};
use may_postgres::types::FromSql;
use may_postgres::Row;
use sea_query::{
    Alias, Cond, Expr, ExprTrait, Func, JoinType, Order, PostgresQueryBuilder, Query,
    SelectStatement,
};

const INVENTORY_COLUMNS: &str = "id, container_no, client_id, size_type, condition, iso_code, \
    manufactured_on, plate_no, hauler, entered_at, gate, handling_count, complete, remarks, \
    exit_link, booking_id, created_by";

const STAGING_COLUMNS: [&str; 17] = [
    "id",
    "client_id",
    "container_no",
    "plate_no",
    "hauler",
    "direction",
    "created_by",
    "status",
    "inv_id",
    "created_at",
    "completed_at",
    "remarks",
    "size_type",
    "condition",
    "iso_code",
    "manufactured_on",
    "checker_id",
];

const BOOKING_COLUMNS: &str = "id, booking_no, client_id, shipper, twenty, forty, forty_five, \
    twenty_rem, forty_rem, forty_five_rem, cont_list, cont_list_rem, expiration_date, status";

pub struct PgYardStore {
    pool: PgPool,
    isolation_level: IsolationLevel,
    statement_timeout_ms: Option<u64>,
}

impl PgYardStore {
    pub fn new(pool: PgPool, config: &DatabaseConfig) -> Self {
        Self {
            pool,
            isolation_level: IsolationLevel::ReadCommitted,
            statement_timeout_ms: Some(config.statement_timeout_ms).filter(|ms| *ms > 0),
        }
    }

    /// Open a pool from `config` and wrap it.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Ok(Self::new(PgPool::connect(config)?, config))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn add_client(&self, code: &str, name: &str) -> Result<Client, StoreError> {
        let conn = self.pool.acquire()?;
        let row = conn.query_one(
            "INSERT INTO clients (code, name) VALUES ($1, $2) RETURNING id",
            &[&code, &name],
        )?;
        Ok(Client {
            id: get(&row, "id")?,
            code: code.to_string(),
            name: name.to_string(),
        })
    }

    pub fn add_user(&self, full_name: &str) -> Result<YardUser, StoreError> {
        let conn = self.pool.acquire()?;
        let row = conn.query_one(
            "INSERT INTO yard_users (full_name) VALUES ($1) RETURNING id",
            &[&full_name],
        )?;
        Ok(YardUser {
            id: get(&row, "id")?,
            full_name: full_name.to_string(),
        })
    }
}

impl YardStore for PgYardStore {
    fn begin(&self) -> Result<Box<dyn YardTx + '_>, StoreError> {
        let conn = self.pool.acquire()?;
        let tx = Transaction::begin(conn, self.isolation_level, self.statement_timeout_ms)?;
        Ok(Box::new(PgYardTx { tx }))
    }
}

struct PgYardTx {
    tx: Transaction,
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, column: &str) -> Result<T, StoreError> {
    row.try_get(column)
        .map_err(|e| StoreError::Parse(format!("column '{column}': {e}")))
}

fn parse_condition(raw: Option<String>) -> Result<Option<Condition>, StoreError> {
    raw.map(|c| c.parse()).transpose()
}

fn inventory_from_row(row: &Row) -> Result<InventoryRecord, StoreError> {
    Ok(InventoryRecord {
        id: get(row, "id")?,
        container_no: get(row, "container_no")?,
        client_id: get(row, "client_id")?,
        size_type: get(row, "size_type")?,
        condition: parse_condition(get(row, "condition")?)?,
        iso_code: get(row, "iso_code")?,
        manufactured_on: get(row, "manufactured_on")?,
        plate_no: get(row, "plate_no")?,
        hauler: get(row, "hauler")?,
        entered_at: get(row, "entered_at")?,
        gate: get::<String>(row, "gate")?.parse()?,
        handling_count: get(row, "handling_count")?,
        complete: get(row, "complete")?,
        remarks: get(row, "remarks")?,
        exit_link: get(row, "exit_link")?,
        booking_id: get(row, "booking_id")?,
        created_by: get(row, "created_by")?,
    })
}

fn staging_from_row(row: &Row) -> Result<StagingEntry, StoreError> {
    Ok(StagingEntry {
        id: get(row, "id")?,
        client_id: get(row, "client_id")?,
        container_no: get(row, "container_no")?,
        plate_no: get(row, "plate_no")?,
        hauler: get(row, "hauler")?,
        direction: get::<String>(row, "direction")?.parse()?,
        created_by: get(row, "created_by")?,
        status: get::<String>(row, "status")?.parse()?,
        inv_id: get(row, "inv_id")?,
        created_at: get(row, "created_at")?,
        completed_at: get(row, "completed_at")?,
        remarks: get(row, "remarks")?,
        detail: GateInDetail {
            size_type: get(row, "size_type")?,
            condition: parse_condition(get(row, "condition")?)?,
            iso_code: get(row, "iso_code")?,
            manufactured_on: get(row, "manufactured_on")?,
            checker_id: get(row, "checker_id")?,
        },
    })
}

fn booking_from_row(row: &Row) -> Result<BookingAllocation, StoreError> {
    Ok(BookingAllocation {
        id: get(row, "id")?,
        booking_no: get(row, "booking_no")?,
        client_id: get(row, "client_id")?,
        shipper: get(row, "shipper")?,
        twenty: get(row, "twenty")?,
        forty: get(row, "forty")?,
        forty_five: get(row, "forty_five")?,
        twenty_rem: get(row, "twenty_rem")?,
        forty_rem: get(row, "forty_rem")?,
        forty_five_rem: get(row, "forty_five_rem")?,
        cont_list: split_list(&get::<String>(row, "cont_list")?),
        cont_list_rem: split_list(&get::<String>(row, "cont_list_rem")?),
        expiration_date: get(row, "expiration_date")?,
        status: get(row, "status")?,
    })
}

fn staging_select() -> String {
    STAGING_COLUMNS.join(", ")
}

/// FROM/JOIN/WHERE shared by the page query and its count.
fn staging_filter(select: &mut SelectStatement, query: &StagingQuery) {
    let mut cond = Cond::all().add(Expr::col(("s", "direction")).eq(query.direction.as_str()));
    if let Some(status) = query.status {
        cond = cond.add(Expr::col(("s", "status")).eq(status.as_str()));
    }
    if let Some(client_id) = query.client_id {
        cond = cond.add(Expr::col(("s", "client_id")).eq(client_id));
    }
    if let Some(term) = query.search_term() {
        let pattern = format!("%{term}%");
        cond = cond.add(
            Cond::any()
                .add(Expr::col(("s", "container_no")).like(pattern.as_str()))
                .add(Expr::expr(Func::upper(Expr::col(("s", "plate_no")))).like(pattern.as_str())),
        );
    }
    select
        .from_as("staging_entries", Alias::new("s"))
        .cond_where(cond);
}

impl PgYardTx {
    fn query_opt_with<T>(
        &self,
        sql: &str,
        params: &[&dyn may_postgres::types::ToSql],
        map: fn(&Row) -> Result<T, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        self.tx.query_opt(sql, params)?.as_ref().map(map).transpose()
    }

    fn notes(&self, table: &str, container_no: &str) -> Result<Option<String>, StoreError> {
        let sql = format!("SELECT notes FROM {table} WHERE container_no = $1");
        self.tx
            .query_opt(&sql, &[&container_no])?
            .map(|row| get(&row, "notes"))
            .transpose()
    }

    fn upsert_notes(&self, table: &str, container_no: &str, notes: &str) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {table} (container_no, notes) VALUES ($1, $2) \
             ON CONFLICT (container_no) DO UPDATE SET notes = EXCLUDED.notes"
        );
        self.tx.execute(&sql, &[&container_no, &notes])?;
        Ok(())
    }

    fn remove_notes(&self, table: &str, container_no: &str) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {table} WHERE container_no = $1");
        Ok(self.tx.execute(&sql, &[&container_no])? > 0)
    }
}

impl YardTx for PgYardTx {
    fn ban_notes(&mut self, container_no: &str) -> Result<Option<String>, StoreError> {
        self.notes("ban_entries", container_no)
    }

    fn hold_notes(&mut self, container_no: &str) -> Result<Option<String>, StoreError> {
        self.notes("hold_entries", container_no)
    }

    fn upsert_ban(&mut self, entry: &BanEntry) -> Result<(), StoreError> {
        self.upsert_notes("ban_entries", &entry.container_no, &entry.notes)
    }

    fn remove_ban(&mut self, container_no: &str) -> Result<bool, StoreError> {
        self.remove_notes("ban_entries", container_no)
    }

    fn upsert_hold(&mut self, entry: &HoldEntry) -> Result<(), StoreError> {
        self.upsert_notes("hold_entries", &entry.container_no, &entry.notes)
    }

    fn remove_hold(&mut self, container_no: &str) -> Result<bool, StoreError> {
        self.remove_notes("hold_entries", container_no)
    }

    fn find_open_in(&mut self, container_no: &str) -> Result<Option<InventoryRecord>, StoreError> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory \
             WHERE container_no = $1 AND gate = 'IN' AND NOT complete"
        );
        self.query_opt_with(&sql, &[&container_no], inventory_from_row)
    }

    fn lock_open_in(&mut self, id: i64) -> Result<Option<InventoryRecord>, StoreError> {
        // A row completed by a concurrent gate-out fails the re-checked WHERE after the wait.
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory \
             WHERE id = $1 AND gate = 'IN' AND NOT complete FOR UPDATE"
        );
        self.query_opt_with(&sql, &[&id], inventory_from_row)
    }

    fn inventory(&mut self, id: i64) -> Result<Option<InventoryRecord>, StoreError> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory WHERE id = $1");
        self.query_opt_with(&sql, &[&id], inventory_from_row)
    }

    fn exit_record_for(&mut self, in_id: i64) -> Result<Option<InventoryRecord>, StoreError> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory WHERE exit_link = $1");
        self.query_opt_with(&sql, &[&in_id], inventory_from_row)
    }

    fn insert_inventory(
        &mut self,
        record: &NewInventoryRecord,
    ) -> Result<InventoryRecord, StoreError> {
        let sql = format!(
            "INSERT INTO inventory (container_no, client_id, size_type, condition, iso_code, \
             manufactured_on, plate_no, hauler, entered_at, gate, handling_count, complete, \
             remarks, exit_link, booking_id, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {INVENTORY_COLUMNS}"
        );
        let condition = record.condition.as_ref().map(Condition::as_str);
        let gate = record.gate.as_str();
        let row = self.tx.query_one(
            &sql,
            &[
                &record.container_no,
                &record.client_id,
                &record.size_type,
                &condition,
                &record.iso_code,
                &record.manufactured_on,
                &record.plate_no,
                &record.hauler,
                &record.entered_at,
                &gate,
                &record.handling_count,
                &record.complete,
                &record.remarks,
                &record.exit_link,
                &record.booking_id,
                &record.created_by,
            ],
        )?;
        inventory_from_row(&row)
    }

    fn mark_complete(&mut self, id: i64) -> Result<(), StoreError> {
        let updated = self
            .tx
            .execute("UPDATE inventory SET complete = TRUE WHERE id = $1", &[&id])?;
        if updated == 0 {
            return Err(StoreError::Other(format!("inventory row {id} does not exist")));
        }
        Ok(())
    }

    fn list_in_yard(&mut self, client_id: Option<i64>) -> Result<Vec<InventoryRecord>, StoreError> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory \
             WHERE gate = 'IN' AND NOT complete AND ($1::BIGINT IS NULL OR client_id = $1) \
             ORDER BY entered_at, id"
        );
        self.tx
            .query_all(&sql, &[&client_id])?
            .iter()
            .map(inventory_from_row)
            .collect()
    }

    fn has_pending_staging(
        &mut self,
        container_no: &str,
        direction: Direction,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let direction = direction.as_str();
        let row = self.tx.query_one(
            "SELECT EXISTS (SELECT 1 FROM staging_entries \
             WHERE container_no = $1 AND direction = $2 AND status = 'PENDING' \
             AND ($3::BIGINT IS NULL OR id <> $3)) AS pending",
            &[&container_no, &direction, &exclude_id],
        )?;
        get(&row, "pending")
    }

    fn insert_staging(
        &mut self,
        draft: &StagingDraft,
        created_at: DateTime<Utc>,
    ) -> Result<StagingEntry, StoreError> {
        let sql = format!(
            "INSERT INTO staging_entries (client_id, container_no, plate_no, hauler, direction, \
             created_by, status, created_at, remarks, size_type, condition, iso_code, \
             manufactured_on, checker_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {}",
            staging_select()
        );
        let container_no = draft.container_no.as_str();
        let direction = draft.direction.as_str();
        let status = StagingStatus::Pending.as_str();
        let condition = draft.detail.condition.as_ref().map(Condition::as_str);
        let row = self.tx.query_one(
            &sql,
            &[
                &draft.client_id,
                &container_no,
                &draft.plate_no,
                &draft.hauler,
                &direction,
                &draft.created_by,
                &status,
                &created_at,
                &draft.remarks,
                &draft.detail.size_type,
                &condition,
                &draft.detail.iso_code,
                &draft.detail.manufactured_on,
                &draft.detail.checker_id,
            ],
        )?;
        staging_from_row(&row)
    }

    fn staging(&mut self, id: i64) -> Result<Option<StagingEntry>, StoreError> {
        let sql = format!("SELECT {} FROM staging_entries WHERE id = $1", staging_select());
        self.query_opt_with(&sql, &[&id], staging_from_row)
    }

    fn lock_staging(&mut self, id: i64) -> Result<Option<StagingEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM staging_entries WHERE id = $1 FOR UPDATE",
            staging_select()
        );
        self.query_opt_with(&sql, &[&id], staging_from_row)
    }

    fn finish_staging(
        &mut self,
        id: i64,
        inv_id: i64,
        checker_id: Option<i64>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let updated = self.tx.execute(
            "UPDATE staging_entries SET status = 'FINISHED', inv_id = $2, completed_at = $3, \
             checker_id = COALESCE($4, checker_id) \
             WHERE id = $1 AND status = 'PENDING'",
            &[&id, &inv_id, &completed_at, &checker_id],
        )?;
        if updated == 0 {
            return Err(StoreError::Other(format!("staging entry {id} is not pending")));
        }
        Ok(())
    }

    fn delete_pending_staging(&mut self, id: i64) -> Result<u64, StoreError> {
        self.tx.execute(
            "DELETE FROM staging_entries WHERE id = $1 AND status = 'PENDING'",
            &[&id],
        )
    }

    fn list_staging(
        &mut self,
        query: &StagingQuery,
    ) -> Result<(Vec<StagingListRow>, u64), StoreError> {
        let mut page = Query::select();
        for column in STAGING_COLUMNS {
            page.column(("s", column));
        }
        page.expr_as(Expr::col(("c", "code")), Alias::new("client_code"))
            .expr_as(Expr::col(("c", "name")), Alias::new("client_name"))
            .expr_as(Expr::col(("u", "full_name")), Alias::new("creator_name"));
        staging_filter(&mut page, query);
        page.join_as(
            JoinType::LeftJoin,
            "clients",
            Alias::new("c"),
            Expr::col(("c", "id")).equals(("s", "client_id")),
        )
        .join_as(
            JoinType::LeftJoin,
            "yard_users",
            Alias::new("u"),
            Expr::col(("u", "id")).equals(("s", "created_by")),
        )
        .order_by(("s", "created_at"), Order::Desc)
        .order_by(("s", "id"), Order::Desc)
        .limit(query.limit())
        .offset(query.offset());

        let mut count = Query::select();
        count.expr_as(Expr::cust("COUNT(*)"), Alias::new("total"));
        staging_filter(&mut count, query);

        let (page_sql, page_values) = page.build(PostgresQueryBuilder);
        let rows =
            with_converted_params(&page_values, |params| self.tx.query_all(&page_sql, params))?;
        let (count_sql, count_values) = count.build(PostgresQueryBuilder);
        let total: i64 = with_converted_params(&count_values, |params| {
            let row = self.tx.query_one(&count_sql, params)?;
            get(&row, "total")
        })?;

        let items = rows
            .iter()
            .map(|row| {
                Ok(StagingListRow {
                    entry: staging_from_row(row)?,
                    client_code: get(row, "client_code")?,
                    client_name: get(row, "client_name")?,
                    creator_name: get(row, "creator_name")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok((items, total.max(0) as u64))
    }

    fn insert_booking(
        &mut self,
        booking: &BookingAllocation,
    ) -> Result<BookingAllocation, StoreError> {
        let sql = format!(
            "INSERT INTO bookings (booking_no, client_id, shipper, twenty, forty, forty_five, \
             twenty_rem, forty_rem, forty_five_rem, cont_list, cont_list_rem, expiration_date, \
             status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {BOOKING_COLUMNS}"
        );
        let cont_list = join_list(&booking.cont_list);
        let cont_list_rem = join_list(&booking.cont_list_rem);
        let row = self.tx.query_one(
            &sql,
            &[
                &booking.booking_no,
                &booking.client_id,
                &booking.shipper,
                &booking.twenty,
                &booking.forty,
                &booking.forty_five,
                &booking.twenty_rem,
                &booking.forty_rem,
                &booking.forty_five_rem,
                &cont_list,
                &cont_list_rem,
                &booking.expiration_date,
                &booking.status,
            ],
        )?;
        booking_from_row(&row)
    }

    fn lock_booking(&mut self, id: i64) -> Result<Option<BookingAllocation>, StoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        self.query_opt_with(&sql, &[&id], booking_from_row)
    }

    fn update_booking_remaining(&mut self, booking: &BookingAllocation) -> Result<(), StoreError> {
        let cont_list_rem = join_list(&booking.cont_list_rem);
        let updated = self.tx.execute(
            "UPDATE bookings SET twenty_rem = $2, forty_rem = $3, forty_five_rem = $4, \
             cont_list_rem = $5, status = $6 WHERE id = $1",
            &[
                &booking.id,
                &booking.twenty_rem,
                &booking.forty_rem,
                &booking.forty_five_rem,
                &cont_list_rem,
                &booking.status,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::Other(format!("booking {} does not exist", booking.id)));
        }
        Ok(())
    }

    fn list_bookings(
        &mut self,
        client_id: Option<i64>,
        today: NaiveDate,
    ) -> Result<Vec<BookingAllocation>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE expiration_date >= $1 AND ($2::BIGINT IS NULL OR client_id = $2) \
             ORDER BY id"
        );
        self.tx
            .query_all(&sql, &[&today, &client_id])?
            .iter()
            .map(booking_from_row)
            .collect()
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback()
    }
}
