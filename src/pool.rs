//! Connection pool for `may_postgres`.
//!
//! Persistent connection slots handed out through a bounded `crossbeam_channel` queue:
//! - `acquire()` waits at most `pool_timeout_seconds` for an idle slot
//! - idle slots are health-checked before use and replaced if dead
//! - a [`PooledConnection`] returns its slot to the queue when dropped

use crate::config::DatabaseConfig;
use crate::connection::{check_connection_health, connect};
use crate::error::StoreError;
use crate::executor::SqlExecutor;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct PoolInner {
    url: String,
    idle_tx: Sender<Client>,
    idle_rx: Receiver<Client>,
    acquire_timeout: Duration,
}

/// Pool of persistent PostgreSQL connections
#[derive(Clone)]
pub struct PgPool {
    inner: Arc<PoolInner>,
}

impl PgPool {
    /// Open `max_connections` connections up front.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let size = config.max_connections.max(1) as usize;
        let (idle_tx, idle_rx) = bounded(size);
        for _ in 0..size {
            let client = connect(&config.url)?;
            idle_tx
                .send(client)
                .map_err(|_| StoreError::Other("connection pool queue closed".to_string()))?;
        }
        log::info!("Connection pool ready with {size} connection(s)");

        Ok(Self {
            inner: Arc::new(PoolInner {
                url: config.url.clone(),
                idle_tx,
                idle_rx,
                acquire_timeout: Duration::from_secs(config.pool_timeout_seconds),
            }),
        })
    }

    /// Take an idle connection, waiting up to the configured timeout.
    pub fn acquire(&self) -> Result<PooledConnection, StoreError> {
        let start = Instant::now();
        let client = match self.inner.idle_rx.recv_timeout(self.inner.acquire_timeout) {
            Ok(client) => client,
            Err(RecvTimeoutError::Timeout) => {
                return Err(StoreError::PoolTimeout(format!(
                    "no connection available within {:?}",
                    self.inner.acquire_timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(StoreError::Other("connection pool queue closed".to_string()))
            }
        };

        let client = if check_connection_health(&client) {
            client
        } else {
            log::warn!("Replacing dead pooled connection");
            match connect(&self.inner.url) {
                Ok(fresh) => fresh,
                Err(e) => {
                    // Keep the slot count stable; the next acquire retries the reconnect.
                    let _ = self.inner.idle_tx.send(client);
                    return Err(e);
                }
            }
        };

        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_connection_wait(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        Ok(PooledConnection {
            client: Some(client),
            home: self.inner.idle_tx.clone(),
        })
    }

    /// Idle connections currently queued.
    pub fn idle(&self) -> usize {
        self.inner.idle_rx.len()
    }
}

/// A connection borrowed from [`PgPool`]
pub struct PooledConnection {
    client: Option<Client>,
    home: Sender<Client>,
}

impl PooledConnection {
    pub fn client(&self) -> Result<&Client, StoreError> {
        self.client
            .as_ref()
            .ok_or_else(|| StoreError::Other("pooled connection already returned".to_string()))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = self.home.send(client);
        }
    }
}

impl SqlExecutor for PooledConnection {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        SqlExecutor::execute(self.client()?, query, params)
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        SqlExecutor::query_one(self.client()?, query, params)
    }

    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, StoreError> {
        SqlExecutor::query_opt(self.client()?, query, params)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        SqlExecutor::query_all(self.client()?, query, params)
    }
}
