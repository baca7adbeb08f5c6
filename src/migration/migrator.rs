//! Migrator - applies registered migrations in version order

use super::state_table::{
    applied_versions, initialize_state_table, record_migration, remove_migration,
};
use super::{CreateYardSchema, Migration, MigrationError, SchemaManager};
use crate::executor::SqlExecutor;
use crate::pool::PgPool;
use crate::transaction::{IsolationLevel, Transaction};
use std::collections::HashSet;
use std::time::Instant;

/// Advisory lock key serialising concurrent migrators ("YARDGATE" in ASCII).
const MIGRATION_LOCK_KEY: i64 = 0x5941_5244_4741_5445;

/// Each migration runs in its own transaction together with its state-table row, so a
/// failed migration leaves neither schema changes nor a record behind.
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    /// Migrator loaded with the yard schema.
    pub fn yard() -> Self {
        Self::new().with(CreateYardSchema)
    }

    pub fn with(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Box::new(migration));
        self.migrations.sort_by_key(|m| m.version());
        self
    }

    fn check_versions(&self) -> Result<(), MigrationError> {
        let mut seen = HashSet::new();
        for m in &self.migrations {
            if !seen.insert(m.version()) {
                return Err(MigrationError::DuplicateVersion(m.version()));
            }
        }
        Ok(())
    }

    /// Registered migrations not yet recorded as applied, in version order.
    pub fn pending(
        &self,
        executor: &dyn SqlExecutor,
    ) -> Result<Vec<&dyn Migration>, MigrationError> {
        initialize_state_table(executor)?;
        let applied: HashSet<i64> = applied_versions(executor)?.into_iter().collect();
        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version()))
            .map(|m| m.as_ref())
            .collect())
    }

    /// Apply all pending migrations. Returns how many were applied.
    pub fn up(&self, pool: &PgPool) -> Result<usize, MigrationError> {
        self.check_versions()?;
        {
            let conn = pool.acquire()?;
            initialize_state_table(&conn)?;
        }

        let mut applied_count = 0;
        for migration in &self.migrations {
            let tx = Transaction::begin(pool.acquire()?, IsolationLevel::ReadCommitted, None)?;
            tx.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])?;

            // Re-read under the lock: another process may have applied it meanwhile.
            if applied_versions(&tx)?.contains(&migration.version()) {
                tx.rollback()?;
                continue;
            }

            let start = Instant::now();
            let manager = SchemaManager::new(&tx);
            migration
                .up(&manager)
                .map_err(|e| MigrationError::ExecutionFailed {
                    version: migration.version(),
                    name: migration.name().to_string(),
                    error: e.to_string(),
                })?;
            let execution_time = start.elapsed().as_millis() as i64;
            record_migration(&tx, migration.version(), migration.name(), execution_time)?;
            tx.commit()?;

            log::info!(
                "Applied migration {} ({}) in {execution_time}ms",
                migration.version(),
                migration.name()
            );
            applied_count += 1;
        }

        Ok(applied_count)
    }

    /// Roll back the most recently applied migration. Returns its version, if any.
    pub fn down(&self, pool: &PgPool) -> Result<Option<i64>, MigrationError> {
        let tx = Transaction::begin(pool.acquire()?, IsolationLevel::ReadCommitted, None)?;
        initialize_state_table(&tx)?;
        tx.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])?;

        let applied = applied_versions(&tx)?;
        let Some(migration) = applied
            .iter()
            .rev()
            .find_map(|v| self.migrations.iter().find(|m| m.version() == *v))
        else {
            tx.rollback()?;
            return Ok(None);
        };

        let manager = SchemaManager::new(&tx);
        migration
            .down(&manager)
            .map_err(|e| MigrationError::ExecutionFailed {
                version: migration.version(),
                name: migration.name().to_string(),
                error: e.to_string(),
            })?;
        remove_migration(&tx, migration.version())?;
        tx.commit()?;

        log::info!(
            "Rolled back migration {} ({})",
            migration.version(),
            migration.name()
        );
        Ok(Some(migration.version()))
    }
}
