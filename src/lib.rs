//! # Yardgate
//!
//! Container yard gate lifecycle engine on PostgreSQL, coroutine-safe under the `may` runtime.
//!
//! Guards stage containers arriving or leaving at the gate; checkers approve the staged
//! entries into permanent inventory records. The [`GateEngine`] owns the rules: no container is
//! in the yard twice, banned containers never enter, held containers never leave, an exit
//! closes exactly one arrival, and a booking never releases more than it reserved.
//!
//! ```ignore
//! use yardgate::{GateContext, GateEngine, PgYardStore, YardConfig};
//!
//! let config = YardConfig::load()?;
//! config.runtime.apply();
//! let store = PgYardStore::connect(&config.database)?;
//! yardgate::Migrator::yard().up(store.pool())?;
//!
//! let engine = GateEngine::with_log_audit(store);
//! let verdict = engine.check_can_gate_in("MSCU1234567", None)?;
//! ```

pub mod audit;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod executor;
#[cfg(any(feature = "metrics", feature = "tracing"))]
pub mod metrics;
pub mod migration;
pub mod model;
pub mod pool;
pub mod store;
pub mod transaction;
pub mod value_conversion;

pub use audit::{AuditEvent, AuditSink, LogAuditSink, MemoryAuditSink};
pub use config::{DatabaseConfig, RuntimeConfig, YardConfig};
pub use engine::{GateContext, GateEngine};
pub use error::{Eligibility, GateError, StoreError};
pub use executor::SqlExecutor;
pub use migration::{Migration, MigrationError, Migrator};
pub use pool::PgPool;
pub use store::{MemoryYardStore, PgYardStore, YardStore, YardTx};
pub use transaction::{IsolationLevel, Transaction};
