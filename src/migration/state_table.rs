//! Migration state table management

use crate::error::StoreError;
use crate::executor::SqlExecutor;

pub const STATE_TABLE: &str = "yardgate_migrations";

/// Create the `yardgate_migrations` table if it does not exist.
///
/// Columns: version, name, applied_at, execution_time_ms.
pub fn initialize_state_table(executor: &dyn SqlExecutor) -> Result<(), StoreError> {
    let sql = r#"
        CREATE TABLE IF NOT EXISTS yardgate_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            execution_time_ms BIGINT
        )
    "#;
    executor.execute(sql, &[])?;
    Ok(())
}

/// Applied versions, ascending.
pub fn applied_versions(executor: &dyn SqlExecutor) -> Result<Vec<i64>, StoreError> {
    let rows = executor.query_all(
        "SELECT version FROM yardgate_migrations ORDER BY version",
        &[],
    )?;
    rows.iter()
        .map(|row| {
            row.try_get::<usize, i64>(0)
                .map_err(|e| StoreError::Parse(format!("migration version: {e}")))
        })
        .collect()
}

pub fn record_migration(
    executor: &dyn SqlExecutor,
    version: i64,
    name: &str,
    execution_time_ms: i64,
) -> Result<(), StoreError> {
    executor.execute(
        "INSERT INTO yardgate_migrations (version, name, execution_time_ms) VALUES ($1, $2, $3)",
        &[&version, &name, &execution_time_ms],
    )?;
    Ok(())
}

pub fn remove_migration(executor: &dyn SqlExecutor, version: i64) -> Result<(), StoreError> {
    executor.execute(
        "DELETE FROM yardgate_migrations WHERE version = $1",
        &[&version],
    )?;
    Ok(())
}
