//! Error types for sqltx
//!
//! This module defines the errors surfaced by a transaction run and by the
//! configuration layer. We use `thiserror` for automatic `Display` and
//! `Error` trait implementations.
//!
//! Driver and body errors are carried as [`BoxError`] so the engine stays
//! independent of any concrete driver. Callers recover the original error
//! with [`TxError::downcast_ref`] or [`TxError::into_source`].

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed, thread-safe error produced by a driver or a transaction body
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type alias for transaction runs
pub type TxResult<T> = std::result::Result<T, TxError>;

/// Optional transaction label used in diagnostic messages
///
/// Displays as ` 'name'` when set and as nothing otherwise, so it can be
/// spliced directly after the word "transaction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxName(Option<String>);

impl TxName {
    /// Create a label from an optional name. Empty names count as unset.
    pub fn new(name: Option<&str>) -> Self {
        Self(name.filter(|n| !n.is_empty()).map(str::to_owned))
    }

    /// The raw name, if one was given
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Prefix used when a non-retryable error is returned as-is
    fn failure_prefix(&self) -> String {
        match &self.0 {
            Some(name) => format!("transaction '{}': ", name),
            None => String::new(),
        }
    }
}

impl fmt::Display for TxName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, " '{}'", name),
            None => Ok(()),
        }
    }
}

/// Error returned by a transaction run
#[derive(Debug, Error)]
pub enum TxError {
    /// The transaction could not be started. Never retried.
    #[error("failed to start transaction{name}: {source}")]
    Begin {
        /// Transaction label
        name: TxName,
        /// Error reported by the beginner
        #[source]
        source: BoxError,
    },

    /// The body or the commit failed with an error no classifier accepted
    #[error("{}{source}", .name.failure_prefix())]
    Failed {
        /// Transaction label
        name: TxName,
        /// The attempt error, unchanged
        #[source]
        source: BoxError,
    },

    /// The backoff policy signalled stop before the transaction succeeded
    #[error("transaction{name} backoff max time reached. Last error: {source}")]
    BackoffExhausted {
        /// Transaction label
        name: TxName,
        /// Attempts made before the policy stopped
        attempts: usize,
        /// Error of the last attempt
        #[source]
        source: BoxError,
    },

    /// All attempts were consumed without a successful commit
    #[error("transaction{name} max retry count ({retries}) exceeded. Last error: {source}")]
    RetriesExhausted {
        /// Transaction label
        name: TxName,
        /// Configured attempt limit
        retries: usize,
        /// Error of the last attempt
        #[source]
        source: BoxError,
    },
}

impl TxError {
    /// The transaction label attached to this error
    pub fn name(&self) -> &TxName {
        match self {
            TxError::Begin { name, .. }
            | TxError::Failed { name, .. }
            | TxError::BackoffExhausted { name, .. }
            | TxError::RetriesExhausted { name, .. } => name,
        }
    }

    /// The underlying driver or body error
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        match self {
            TxError::Begin { source, .. }
            | TxError::Failed { source, .. }
            | TxError::BackoffExhausted { source, .. }
            | TxError::RetriesExhausted { source, .. } => source.as_ref(),
        }
    }

    /// Consume the error and return the underlying driver or body error
    pub fn into_source(self) -> BoxError {
        match self {
            TxError::Begin { source, .. }
            | TxError::Failed { source, .. }
            | TxError::BackoffExhausted { source, .. }
            | TxError::RetriesExhausted { source, .. } => source,
        }
    }

    /// Find an error of type `E` anywhere in the underlying error chain
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        find_cause::<E>(self.inner())
    }

    /// Whether the retry budget (time or count) was exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            TxError::BackoffExhausted { .. } | TxError::RetriesExhausted { .. }
        )
    }

    /// Whether the final failing step was the commit
    pub fn is_commit_failure(&self) -> bool {
        !matches!(self, TxError::Begin { .. }) && self.inner().is::<CommitError>()
    }
}

/// Wrapper marking an error raised by `Transaction::commit`
#[derive(Debug, Error)]
#[error("commit error: {0}")]
pub struct CommitError(#[source] pub BoxError);

/// Errors raised while building or installing configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Global configuration was already frozen by first use or installation
    #[error("sqltx global configuration is already initialized")]
    AlreadyInitialized,

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Configuration file could not be read or written
    #[error("Failed to access config file '{path}': {source}")]
    Io {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

/// Iterate over an error and all of its sources, outermost first
pub fn error_chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> + 'a {
    std::iter::successors(Some(err), |&e| e.source())
}

/// Find the first error of type `E` in an error chain
pub fn find_cause<'a, E: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a E> {
    error_chain(err).find_map(|e| e.downcast_ref::<E>())
}
