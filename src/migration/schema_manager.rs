//! SchemaManager - schema operations for migrations

use crate::error::StoreError;
use crate::executor::SqlExecutor;
use sea_query::{
    IndexCreateStatement, PostgresQueryBuilder, TableCreateStatement, TableDropStatement,
};

/// Runs DDL through a borrowed executor, usually the migration's transaction.
pub struct SchemaManager<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Create a table
    ///
    /// # Example
    /// ```rust,no_run
    /// use sea_query::{ColumnDef, Table};
    /// # fn run(manager: &yardgate::migration::SchemaManager<'_>) -> Result<(), yardgate::error::StoreError> {
    /// let table = Table::create()
    ///     .table("gates")
    ///     .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
    ///     .col(ColumnDef::new("name").string().not_null())
    ///     .to_owned();
    /// manager.create_table(table)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), StoreError> {
        let sql = table.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    pub fn drop_table(&self, table: TableDropStatement) -> Result<(), StoreError> {
        let sql = table.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), StoreError> {
        let sql = index.build(PostgresQueryBuilder);
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    /// Execute raw SQL, for DDL SeaQuery cannot express (partial indexes, named checks).
    pub fn execute(&self, sql: &str) -> Result<(), StoreError> {
        self.executor.execute(sql, &[]).map(|_| ())
    }

    pub fn executor(&self) -> &dyn SqlExecutor {
        self.executor
    }
}
