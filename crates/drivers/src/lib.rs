//! Driver integrations for sqltx
//!
//! - Postgres: SQLSTATE-based classifier for PostgreSQL-compatible servers
//! - Sqlite: `TxBeginner` adapter over `rusqlite` plus a busy/locked
//!   classifier (feature `sqlite`)
//!
//! Each integration exposes a `register_*_classifier()` function to call
//! once during initialization, before the first transaction runs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use postgres::{register_postgres_classifier, PgError, PostgresClassifier};
#[cfg(feature = "sqlite")]
pub use sqlite::{register_sqlite_classifier, SqliteClassifier, SqliteDb, SqliteError, SqliteTx};
