//! PostgreSQL-family retry classification
//!
//! PostgreSQL reports transient conflicts through SQLSTATE codes:
//!
//! | Code    | Condition                | Retried                               |
//! |---------|--------------------------|---------------------------------------|
//! | `40001` | serialization_failure    | always                                |
//! | `40P01` | deadlock_detected        | always                                |
//! | `25P02` | in_failed_sql_transaction| only if the message says "try again"  |
//!
//! CockroachDB and other wire-compatible servers use the same codes, which
//! is where the `25P02` + "try again" combination shows up.
//!
//! Driver bridges convert their server error into [`PgError`] (or keep it
//! as a `source()` of their own error); the classifier finds it anywhere in
//! the error chain.

use std::error::Error as StdError;

use sqltx_core::{find_cause, ConfigError, RetryClassifier};
use thiserror::Error;

/// SQLSTATE serialization_failure
pub const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE deadlock_detected
pub const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE in_failed_sql_transaction
pub const IN_FAILED_SQL_TRANSACTION: &str = "25P02";

/// Server-reported PostgreSQL error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (SQLSTATE {code})")]
pub struct PgError {
    /// Five-character SQLSTATE code
    pub code: String,
    /// Primary human-readable message
    pub message: String,
}

impl PgError {
    /// Create an error from a SQLSTATE code and a message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a transient conflict worth retrying
    pub fn is_retryable(&self) -> bool {
        match self.code.as_str() {
            SERIALIZATION_FAILURE | DEADLOCK_DETECTED => true,
            IN_FAILED_SQL_TRANSACTION => self.message.to_lowercase().contains("try again"),
            _ => false,
        }
    }
}

/// Classifier for PostgreSQL serialization failures and deadlocks
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresClassifier;

impl PostgresClassifier {
    /// Registration name
    pub const NAME: &'static str = "postgres";
}

impl RetryClassifier for PostgresClassifier {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_retryable(&self, err: &(dyn StdError + 'static)) -> bool {
        find_cause::<PgError>(err).map_or(false, PgError::is_retryable)
    }
}

/// Register [`PostgresClassifier`] with the process-wide registry
///
/// Idempotent: returns `Ok(false)` if it was already registered.
///
/// # Errors
///
/// Returns [`ConfigError::AlreadyInitialized`] once the global
/// configuration is frozen.
pub fn register_postgres_classifier() -> Result<bool, ConfigError> {
    sqltx_engine::register_classifier(PostgresClassifier)
}
