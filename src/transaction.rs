//! Transaction support on a pooled connection.
//!
//! - `Transaction` implements `SqlExecutor`
//! - isolation level and per-transaction statement timeout
//! - commit/rollback consume the transaction; dropping an open one rolls it back

use crate::error::StoreError;
use crate::executor::SqlExecutor;
use crate::pool::PooledConnection;
use may_postgres::types::ToSql;
use may_postgres::Row;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read committed (default)
    ReadCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Serializable
    Serializable,
}

impl IsolationLevel {
    /// Convert to PostgreSQL SQL syntax
    fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// A database transaction holding its pooled connection until it ends
pub struct Transaction {
    conn: PooledConnection,
    closed: bool,
}

impl Transaction {
    /// Begin a transaction on `conn`.
    ///
    /// `statement_timeout_ms` is applied with `SET LOCAL`, so it expires with the transaction
    /// and never leaks to the next borrower of the connection.
    pub fn begin(
        conn: PooledConnection,
        isolation_level: IsolationLevel,
        statement_timeout_ms: Option<u64>,
    ) -> Result<Self, StoreError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        let begin_sql = format!("BEGIN ISOLATION LEVEL {}", isolation_level.to_sql());
        conn.execute(&begin_sql, &[])?;

        let tx = Self {
            conn,
            closed: false,
        };
        if let Some(ms) = statement_timeout_ms {
            // SET does not accept bind parameters
            tx.execute(&format!("SET LOCAL statement_timeout = {ms}"), &[])?;
        }
        Ok(tx)
    }

    /// Commit the transaction
    pub fn commit(mut self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        // Whatever COMMIT returns, the transaction is over on this connection.
        self.closed = true;
        self.conn.execute("COMMIT", &[])?;
        Ok(())
    }

    /// Rollback the transaction
    pub fn rollback(mut self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.closed = true;
        self.conn.execute("ROLLBACK", &[])?;
        Ok(())
    }

    /// Check if the transaction is closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::TransactionClosed);
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::rollback_transaction_span().entered();

            if let Err(e) = self.conn.execute("ROLLBACK", &[]) {
                log::error!("Rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

impl SqlExecutor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        self.ensure_open()?;
        self.conn.execute(query, params)
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        self.ensure_open()?;
        self.conn.query_one(query, params)
    }

    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, StoreError> {
        self.ensure_open()?;
        self.conn.query_opt(query, params)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        self.ensure_open()?;
        self.conn.query_all(query, params)
    }
}
