//! sqltx - Relational database transactions with automatic retry
//!
//! sqltx runs a transaction body and, when the database reports a transient
//! conflict (serialization failure, deadlock, lock contention), rolls the
//! attempt back, waits according to a backoff schedule, and runs the body
//! again in a fresh transaction.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqltx::{run, Context, Options, SqliteDb};
//!
//! // Once, during initialization
//! sqltx::register_sqlite_classifier()?;
//!
//! let db = SqliteDb::open("app.db")?;
//! let ctx = Context::background();
//!
//! let balance: i64 = run(&ctx, &db, &Options::new().name("transfer"), |tx| {
//!     tx.execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1", [])?;
//!     tx.execute("UPDATE accounts SET balance = balance + 10 WHERE id = 2", [])?;
//!     tx.query_row("SELECT balance FROM accounts WHERE id = 1", [], |row| row.get(0))
//! })?;
//! ```
//!
//! # Architecture
//!
//! - `sqltx-core`: error taxonomy, cancellation context, capability traits
//! - `sqltx-engine`: retry orchestrator, backoff, classifier registry, config
//! - `sqltx-drivers`: PostgreSQL classifier and SQLite adapter
//!
//! The body may run more than once. It must keep its side effects inside
//! the transaction it is given.

pub use sqltx_core::{
    error_chain, find_cause, BoxError, CommitError, ConfigError, Context, ContextError,
    FnClassifier, IsolationLevel, RetryClassifier, Transaction, TxBeginner, TxError, TxName,
    TxOptions, TxResult,
};
pub use sqltx_drivers::{register_postgres_classifier, PgError, PostgresClassifier};
#[cfg(feature = "sqlite")]
pub use sqltx_drivers::{
    register_sqlite_classifier, SqliteClassifier, SqliteDb, SqliteError, SqliteTx,
};
pub use sqltx_engine::{
    default_max_retries, global_config, init_global, is_global_initialized, register_classifier,
    run, set_default_backoff, set_default_max_retries, set_default_sleeper, Backoff,
    BackoffPolicy, BackoffSettings, ClassifierRegistry, Clock, ConstantBackoff, DefaultSleeper,
    ExponentialBackoff, NoopSleeper, Options, Retrier, RetrySettings, Sleeper, SystemClock,
    TxConfig, ZeroBackoff, CONFIG_FILE_NAME, DEFAULT_MAX_RETRIES,
};
