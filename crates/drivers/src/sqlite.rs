//! SQLite adapter built on `rusqlite`
//!
//! [`SqliteDb`] wraps a [`rusqlite::Connection`] and implements
//! [`TxBeginner`], so it can be handed straight to the retry engine. The
//! handle, [`SqliteTx`], derefs to the connection; the transaction body runs
//! its statements through the usual `execute`/`query_row`/`prepare` methods.
//!
//! ## Start options
//!
//! SQLite transactions are always serializable. The start options map onto
//! the two locking modes SQLite offers:
//!
//! | Options                      | Statement                               |
//! |------------------------------|-----------------------------------------|
//! | `Default`                    | `BEGIN DEFERRED`                        |
//! | `Serializable`               | `BEGIN IMMEDIATE` (takes the write lock)|
//! | read-only (either level)     | `BEGIN DEFERRED` + `PRAGMA query_only`  |
//! | anything else                | rejected with [`SqliteError::UnsupportedIsolation`] |
//!
//! ## Retryable errors
//!
//! [`SqliteClassifier`] retries `SQLITE_BUSY` and `SQLITE_LOCKED`, the codes
//! SQLite returns when another connection holds a conflicting lock.

use std::error::Error as StdError;
use std::ops::Deref;
use std::path::Path;

use rusqlite::{Connection, ErrorCode};
use sqltx_core::{
    find_cause, ConfigError, Context, ContextError, IsolationLevel, RetryClassifier,
    Transaction, TxBeginner, TxOptions,
};
use thiserror::Error;
use tracing::debug;

/// Errors raised by the SQLite adapter
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Error reported by SQLite
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Commit or rollback on a transaction that already ended
    #[error("transaction has already been committed or rolled back")]
    Done,

    /// The requested isolation level cannot be honoured by SQLite
    #[error("isolation level {0} is not supported by SQLite")]
    UnsupportedIsolation(IsolationLevel),

    /// The context was done before the transaction started
    #[error("{0}")]
    Cancelled(#[from] ContextError),
}

/// Statement that opens a transaction for `opts`
fn begin_statement(opts: &TxOptions) -> Result<&'static str, SqliteError> {
    match opts.isolation {
        IsolationLevel::Default => Ok("BEGIN DEFERRED"),
        IsolationLevel::Serializable if opts.read_only => Ok("BEGIN DEFERRED"),
        IsolationLevel::Serializable => Ok("BEGIN IMMEDIATE"),
        other => Err(SqliteError::UnsupportedIsolation(other)),
    }
}

/// SQLite connection usable as a transaction source
///
/// Derefs to the wrapped [`Connection`] for statements outside a retried
/// transaction (schema setup, pragmas).
#[derive(Debug)]
pub struct SqliteDb {
    conn: Connection,
}

impl SqliteDb {
    /// Wrap an open connection
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open (or create) a database file
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SqliteError> {
        Ok(Self::new(Connection::open(path)?))
    }

    /// Open a private in-memory database
    ///
    /// # Errors
    ///
    /// Returns the SQLite error if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, SqliteError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// The wrapped connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Unwrap the connection
    pub fn into_inner(self) -> Connection {
        self.conn
    }
}

impl From<Connection> for SqliteDb {
    fn from(conn: Connection) -> Self {
        Self::new(conn)
    }
}

impl Deref for SqliteDb {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl TxBeginner for SqliteDb {
    type Tx<'a> = SqliteTx<'a>;
    type Error = SqliteError;

    fn begin_tx<'a>(&'a self, ctx: &Context, opts: &TxOptions) -> Result<SqliteTx<'a>, SqliteError> {
        if let Some(reason) = ctx.err() {
            return Err(reason.into());
        }
        let statement = begin_statement(opts)?;
        self.conn.execute_batch(statement)?;

        let mut tx = SqliteTx {
            conn: &self.conn,
            read_only: false,
            finished: false,
        };
        if opts.read_only {
            // Dropping `tx` on error rolls the open transaction back
            self.conn.pragma_update(None, "query_only", true)?;
            tx.read_only = true;
        }
        debug!(target: "sqltx::tx", statement, read_only = opts.read_only, "SQLite transaction started");
        Ok(tx)
    }
}

/// Live SQLite transaction
///
/// Derefs to the underlying [`Connection`]. Dropping an unfinished handle
/// rolls it back.
#[derive(Debug)]
pub struct SqliteTx<'a> {
    conn: &'a Connection,
    read_only: bool,
    finished: bool,
}

impl SqliteTx<'_> {
    /// Whether the handle was started read-only
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether commit or rollback already ended the transaction
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn end(&mut self, statement: &str) -> Result<(), SqliteError> {
        if self.finished {
            return Err(SqliteError::Done);
        }
        let result = self.conn.execute_batch(statement);
        // A failed COMMIT (SQLITE_BUSY) leaves the transaction open, so the
        // handle stays usable for the rollback that follows.
        if result.is_ok() || self.conn.is_autocommit() {
            self.finished = true;
            if self.read_only {
                if let Err(e) = self.conn.pragma_update(None, "query_only", false) {
                    debug!(target: "sqltx::tx", error = %e, "Failed to reset query_only");
                }
            }
        }
        result.map_err(SqliteError::from)
    }
}

impl Deref for SqliteTx<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Transaction for SqliteTx<'_> {
    type Error = SqliteError;

    fn commit(&mut self) -> Result<(), SqliteError> {
        self.end("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), SqliteError> {
        self.end("ROLLBACK")
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.end("ROLLBACK") {
                debug!(target: "sqltx::tx", error = %e, "Rollback on drop failed");
            }
        }
    }
}

/// Classifier for SQLite lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteClassifier;

impl SqliteClassifier {
    /// Registration name
    pub const NAME: &'static str = "sqlite";
}

impl RetryClassifier for SqliteClassifier {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_retryable(&self, err: &(dyn StdError + 'static)) -> bool {
        match find_cause::<rusqlite::Error>(err) {
            Some(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

/// Register [`SqliteClassifier`] with the process-wide registry
///
/// Idempotent: returns `Ok(false)` if it was already registered.
///
/// # Errors
///
/// Returns [`ConfigError::AlreadyInitialized`] once the global
/// configuration is frozen.
pub fn register_sqlite_classifier() -> Result<bool, ConfigError> {
    sqltx_engine::register_classifier(SqliteClassifier)
}
