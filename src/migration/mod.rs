//! Schema migrations for the yard database
//!
//! - [`Migration`] trait with synchronous `up`/`down`
//! - [`SchemaManager`] for DDL built with SeaQuery or raw SQL
//! - [`Migrator`] applying pending migrations in version order, one transaction each,
//!   and recording them in `yardgate_migrations`
//!
//! # Example
//!
//! ```rust,no_run
//! use yardgate::config::YardConfig;
//! use yardgate::migration::Migrator;
//! use yardgate::pool::PgPool;
//!
//! let config = YardConfig::load()?;
//! let pool = PgPool::connect(&config.database)?;
//! let applied = Migrator::yard().up(&pool)?;
//! println!("applied {applied} migration(s)");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod migration;
pub mod migrator;
pub mod schema_manager;
pub mod state_table;
pub mod yard_schema;

pub use error::MigrationError;
pub use migration::Migration;
pub use migrator::Migrator;
pub use schema_manager::SchemaManager;
pub use yard_schema::CreateYardSchema;
