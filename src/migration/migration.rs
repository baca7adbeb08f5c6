//! Migration trait definition

use super::schema_manager::SchemaManager;
use crate::error::StoreError;

/// Trait that all migrations must implement
///
/// The runtime is coroutine based (`may`), so `up`/`down` are synchronous; the executor
/// blocks only the calling coroutine.
pub trait Migration: Send + Sync {
    /// Human-readable identifier
    fn name(&self) -> &str;

    /// Version (timestamp: YYYYMMDDHHMMSS)
    fn version(&self) -> i64;

    /// Apply the migration
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), StoreError>;

    /// Undo the migration
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), StoreError>;
}
