//! Initial yard schema.
//!
//! Tables are built with SeaQuery. Named checks, foreign keys, and the partial unique indexes
//! that carry the gate invariants are raw SQL; the unique index names are the constraint
//! names [`crate::error`] maps back to domain errors.

use super::{Migration, SchemaManager};
use crate::error::{
    StoreError, BOOKING_NO_CONSTRAINT, EXIT_LINK_CONSTRAINT, OPEN_IN_CONSTRAINT,
    PENDING_STAGING_CONSTRAINT,
};
use sea_query::{ColumnDef, Table, TableCreateStatement};

pub struct CreateYardSchema;

/// Creation order; drop in reverse.
const TABLES: [&str; 7] = [
    "clients",
    "yard_users",
    "ban_entries",
    "hold_entries",
    "bookings",
    "inventory",
    "staging_entries",
];

fn id_column() -> ColumnDef {
    ColumnDef::new("id")
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

pub fn tables() -> Vec<TableCreateStatement> {
    vec![
        Table::create()
            .table("clients")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("code").string_len(32).not_null().unique_key())
            .col(ColumnDef::new("name").string_len(255).not_null())
            .to_owned(),
        Table::create()
            .table("yard_users")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("full_name").string_len(255).not_null())
            .to_owned(),
        Table::create()
            .table("ban_entries")
            .if_not_exists()
            .col(ColumnDef::new("container_no").string_len(11).not_null().primary_key())
            .col(ColumnDef::new("notes").text().not_null())
            .to_owned(),
        Table::create()
            .table("hold_entries")
            .if_not_exists()
            .col(ColumnDef::new("container_no").string_len(11).not_null().primary_key())
            .col(ColumnDef::new("notes").text().not_null())
            .to_owned(),
        Table::create()
            .table("bookings")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("booking_no").string_len(64).not_null())
            .col(ColumnDef::new("client_id").big_integer().not_null())
            .col(ColumnDef::new("shipper").string_len(255).not_null())
            .col(ColumnDef::new("twenty").integer().not_null().default(0))
            .col(ColumnDef::new("forty").integer().not_null().default(0))
            .col(ColumnDef::new("forty_five").integer().not_null().default(0))
            .col(ColumnDef::new("twenty_rem").integer().not_null().default(0))
            .col(ColumnDef::new("forty_rem").integer().not_null().default(0))
            .col(ColumnDef::new("forty_five_rem").integer().not_null().default(0))
            .col(ColumnDef::new("cont_list").text().not_null().default(""))
            .col(ColumnDef::new("cont_list_rem").text().not_null().default(""))
            .col(ColumnDef::new("expiration_date").date().not_null())
            .col(ColumnDef::new("status").string_len(16).not_null())
            .to_owned(),
        Table::create()
            .table("inventory")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("container_no").string_len(11).not_null())
            .col(ColumnDef::new("client_id").big_integer().null())
            .col(ColumnDef::new("size_type").string_len(8).null())
            .col(ColumnDef::new("condition").string_len(8).null())
            .col(ColumnDef::new("iso_code").string_len(8).null())
            .col(ColumnDef::new("manufactured_on").date().null())
            .col(ColumnDef::new("plate_no").string_len(32).not_null())
            .col(ColumnDef::new("hauler").string_len(255).not_null())
            .col(ColumnDef::new("entered_at").timestamp_with_time_zone().not_null())
            .col(ColumnDef::new("gate").string_len(3).not_null())
            .col(ColumnDef::new("handling_count").integer().not_null())
            .col(ColumnDef::new("complete").boolean().not_null().default(false))
            .col(ColumnDef::new("remarks").text().not_null().default(""))
            .col(ColumnDef::new("exit_link").big_integer().null())
            .col(ColumnDef::new("booking_id").big_integer().null())
            .col(ColumnDef::new("created_by").big_integer().not_null())
            .to_owned(),
        Table::create()
            .table("staging_entries")
            .if_not_exists()
            .col(id_column())
            .col(ColumnDef::new("client_id").big_integer().null())
            .col(ColumnDef::new("container_no").string_len(11).not_null())
            .col(ColumnDef::new("plate_no").string_len(32).not_null())
            .col(ColumnDef::new("hauler").string_len(255).not_null())
            .col(ColumnDef::new("direction").string_len(3).not_null())
            .col(ColumnDef::new("created_by").big_integer().not_null())
            .col(ColumnDef::new("status").string_len(16).not_null())
            .col(ColumnDef::new("inv_id").big_integer().null())
            .col(ColumnDef::new("created_at").timestamp_with_time_zone().not_null())
            .col(ColumnDef::new("completed_at").timestamp_with_time_zone().null())
            .col(ColumnDef::new("remarks").text().not_null().default(""))
            .col(ColumnDef::new("size_type").string_len(8).null())
            .col(ColumnDef::new("condition").string_len(8).null())
            .col(ColumnDef::new("iso_code").string_len(8).null())
            .col(ColumnDef::new("manufactured_on").date().null())
            .col(ColumnDef::new("checker_id").big_integer().null())
            .to_owned(),
    ]
}

/// Foreign keys and row checks.
pub fn constraints() -> Vec<String> {
    vec![
        "ALTER TABLE bookings ADD CONSTRAINT fk_bookings_client \
         FOREIGN KEY (client_id) REFERENCES clients (id)"
            .to_string(),
        "ALTER TABLE bookings ADD CONSTRAINT ck_bookings_rem_range CHECK (\
         twenty_rem BETWEEN 0 AND twenty \
         AND forty_rem BETWEEN 0 AND forty \
         AND forty_five_rem BETWEEN 0 AND forty_five)"
            .to_string(),
        "ALTER TABLE inventory ADD CONSTRAINT fk_inventory_client \
         FOREIGN KEY (client_id) REFERENCES clients (id)"
            .to_string(),
        "ALTER TABLE inventory ADD CONSTRAINT fk_inventory_exit_link \
         FOREIGN KEY (exit_link) REFERENCES inventory (id)"
            .to_string(),
        "ALTER TABLE inventory ADD CONSTRAINT fk_inventory_booking \
         FOREIGN KEY (booking_id) REFERENCES bookings (id)"
            .to_string(),
        "ALTER TABLE inventory ADD CONSTRAINT ck_inventory_gate CHECK (gate IN ('IN', 'OUT'))"
            .to_string(),
        "ALTER TABLE inventory ADD CONSTRAINT ck_inventory_condition \
         CHECK (condition IS NULL OR condition IN ('EMPTY', 'FULL'))"
            .to_string(),
        // OUT rows are written closed and always point at the IN row they close.
        "ALTER TABLE inventory ADD CONSTRAINT ck_inventory_out_linked \
         CHECK (gate = 'IN' OR (complete AND exit_link IS NOT NULL))"
            .to_string(),
        "ALTER TABLE staging_entries ADD CONSTRAINT fk_staging_client \
         FOREIGN KEY (client_id) REFERENCES clients (id)"
            .to_string(),
        "ALTER TABLE staging_entries ADD CONSTRAINT fk_staging_inventory \
         FOREIGN KEY (inv_id) REFERENCES inventory (id)"
            .to_string(),
        "ALTER TABLE staging_entries ADD CONSTRAINT ck_staging_direction \
         CHECK (direction IN ('IN', 'OUT'))"
            .to_string(),
        "ALTER TABLE staging_entries ADD CONSTRAINT ck_staging_status \
         CHECK (status IN ('PENDING', 'FINISHED'))"
            .to_string(),
        "ALTER TABLE staging_entries ADD CONSTRAINT ck_staging_completion CHECK (\
         (status = 'PENDING' AND completed_at IS NULL AND inv_id IS NULL) \
         OR (status = 'FINISHED' AND completed_at IS NOT NULL AND inv_id IS NOT NULL))"
            .to_string(),
    ]
}

pub fn indexes() -> Vec<String> {
    vec![
        format!("CREATE UNIQUE INDEX {BOOKING_NO_CONSTRAINT} ON bookings (booking_no)"),
        format!(
            "CREATE UNIQUE INDEX {OPEN_IN_CONSTRAINT} ON inventory (container_no) \
             WHERE gate = 'IN' AND NOT complete"
        ),
        format!(
            "CREATE UNIQUE INDEX {EXIT_LINK_CONSTRAINT} ON inventory (exit_link) \
             WHERE exit_link IS NOT NULL"
        ),
        format!(
            "CREATE UNIQUE INDEX {PENDING_STAGING_CONSTRAINT} ON staging_entries \
             (container_no) WHERE status = 'PENDING' AND direction = 'IN'"
        ),
        "CREATE INDEX idx_inventory_client_open ON inventory (client_id) \
         WHERE gate = 'IN' AND NOT complete"
            .to_string(),
        "CREATE INDEX idx_staging_direction_created ON staging_entries \
         (direction, created_at DESC)"
            .to_string(),
        "CREATE INDEX idx_bookings_client_expiry ON bookings (client_id, expiration_date)"
            .to_string(),
    ]
}

impl Migration for CreateYardSchema {
    fn name(&self) -> &str {
        "create_yard_schema"
    }

    fn version(&self) -> i64 {
        20240601000000
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), StoreError> {
        for table in tables() {
            manager.create_table(table)?;
        }
        for sql in constraints().iter().chain(indexes().iter()) {
            manager.execute(sql)?;
        }
        Ok(())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), StoreError> {
        for table in TABLES.iter().rev() {
            manager.execute(&format!("DROP TABLE IF EXISTS {table} CASCADE"))?;
        }
        Ok(())
    }
}
