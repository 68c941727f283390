//! Database layer
//!
//! Supports SQLite (default, single file deployment) and MySQL. The driver is
//! selected by configuration; everything above this module talks to the
//! `DatabasePool` trait and the repository traits in [`repositories`].
//!
//! ```ignore
//! use plaja::config::DatabaseConfig;
//! use plaja::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
