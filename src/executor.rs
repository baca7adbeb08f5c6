//! `SqlExecutor` - statement execution over `may_postgres`.
//!
//! The trait abstracts "something that can run SQL": a pooled connection for schema work and
//! one-off reads, or a [`Transaction`](crate::transaction::Transaction) for a gate unit of
//! work. All calls block the current coroutine (or thread) until PostgreSQL answers.

use crate::error::StoreError;
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Trait for executing database statements
///
/// # Examples
///
/// ```no_run
/// use yardgate::executor::SqlExecutor;
/// use yardgate::error::StoreError;
///
/// # fn example(executor: &dyn SqlExecutor) -> Result<(), StoreError> {
/// let open: i64 = executor
///     .query_one("SELECT COUNT(*) FROM inventory WHERE NOT complete", &[])?
///     .get(0);
/// # Ok(())
/// # }
/// ```
pub trait SqlExecutor {
    /// Execute a statement and return the number of rows affected
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError>;

    /// Execute a query that must return exactly one row
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError>;

    /// Execute a query that returns zero or one row
    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, StoreError>;

    /// Execute a query and return all rows
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError>;
}

/// Run one statement against `client` with span, timing, and error accounting.
pub(crate) fn instrumented<T>(
    query: &str,
    run: impl FnOnce() -> Result<T, may_postgres::Error>,
) -> Result<T, StoreError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = query;

    let start = Instant::now();
    let result = run().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        StoreError::from(e)
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(duration);
    #[cfg(not(feature = "metrics"))]
    let _ = duration;

    result
}

impl SqlExecutor for Client {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        instrumented(query, || Client::execute(self, query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        instrumented(query, || Client::query_one(self, query, params))
    }

    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, StoreError> {
        let mut rows = instrumented(query, || Client::query(self, query, params))?;
        if rows.len() > 1 {
            return Err(StoreError::Other(format!(
                "expected at most one row, got {}",
                rows.len()
            )));
        }
        Ok(rows.pop())
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        instrumented(query, || Client::query(self, query, params))
    }
}

/// Query a single value from the first column of the only row.
pub fn query_value<T>(
    executor: &dyn SqlExecutor,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<T, StoreError>
where
    T: for<'a> may_postgres::types::FromSql<'a>,
{
    let row = executor.query_one(sql, params)?;
    row.try_get::<usize, T>(0)
        .map_err(|e| StoreError::Parse(format!("Failed to extract value: {e}")))
}
