//! Per-call transaction options

use std::sync::Arc;

use sqltx_core::{IsolationLevel, TxName, TxOptions};

use crate::backoff::BackoffPolicy;
use crate::sleeper::Sleeper;

/// Options for one transaction run
///
/// Every field is optional; unset fields fall back to the
/// [`TxConfig`](crate::TxConfig) the run uses. The run only reads the
/// options and never changes them.
///
/// # Example
/// ```
/// use sqltx_engine::Options;
/// use sqltx_core::IsolationLevel;
///
/// let opts = Options::new()
///     .name("transfer")
///     .isolation(IsolationLevel::Serializable)
///     .max_retries(5);
/// assert_eq!(opts.name.as_deref(), Some("transfer"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Label used in error messages and logs
    pub name: Option<String>,
    /// Isolation level passed to the beginner
    pub isolation: IsolationLevel,
    /// Read-only hint passed to the beginner
    pub read_only: bool,
    /// Attempt limit; zero or `None` uses the configured default
    pub max_retries: Option<usize>,
    /// Backoff policy override
    pub backoff: Option<Arc<dyn BackoffPolicy>>,
    /// Sleeper override
    pub sleeper: Option<Arc<dyn Sleeper>>,
}

impl Options {
    /// Options that defer to the configured defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the diagnostic label
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the isolation level
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set the read-only hint
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Override the attempt limit
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Override the backoff policy
    pub fn backoff<P: BackoffPolicy + 'static>(mut self, policy: P) -> Self {
        self.backoff = Some(Arc::new(policy));
        self
    }

    /// Override the sleeper
    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    /// Start options for the beginner
    pub fn tx_options(&self) -> TxOptions {
        TxOptions::new(self.isolation, self.read_only)
    }

    /// Label for diagnostics
    pub fn tx_name(&self) -> TxName {
        TxName::new(self.name.as_deref())
    }

    /// Attempt limit, if one is set
    pub(crate) fn retry_limit(&self) -> Option<usize> {
        self.max_retries.filter(|n| *n > 0)
    }
}
