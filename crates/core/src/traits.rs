//! Capability traits for transaction handles, beginners and classifiers
//!
//! These traits decouple the retry engine from any concrete driver. A
//! driver integration implements [`TxBeginner`] for its connection source
//! and [`Transaction`] for its live transaction type; the engine never
//! inspects anything beyond begin, commit and rollback. Everything else a
//! handle offers (prepare, exec, query) is reached by the transaction body
//! directly on the concrete handle type.

use std::error::Error as StdError;

use crate::context::Context;
use crate::options::TxOptions;

/// A live transaction owned by exactly one attempt
///
/// After `commit` or `rollback` has been called once the handle is
/// finished; the engine never calls either again except for a best-effort
/// `rollback` after a failed `commit`.
pub trait Transaction {
    /// Error reported by the driver
    type Error: StdError + Send + Sync + 'static;

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns the driver error if the commit did not succeed. Commit
    /// errors are candidates for retry.
    fn commit(&mut self) -> Result<(), Self::Error>;

    /// Roll the transaction back
    ///
    /// # Errors
    ///
    /// Returns the driver error if the rollback failed. The engine discards
    /// rollback errors.
    fn rollback(&mut self) -> Result<(), Self::Error>;
}

/// Source of new transactions
///
/// Thread safety: implementations shared between threads must be `Sync`;
/// the engine only ever calls `begin_tx` through a shared reference.
pub trait TxBeginner {
    /// Transaction handle produced by this beginner
    type Tx<'a>: Transaction
    where
        Self: 'a;

    /// Error reported when a transaction cannot be started
    type Error: StdError + Send + Sync + 'static;

    /// Start a new transaction
    ///
    /// Implementations should fail promptly when `ctx` is already done.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the transaction could not be started.
    /// Begin errors are never retried.
    fn begin_tx<'a>(&'a self, ctx: &Context, opts: &TxOptions) -> Result<Self::Tx<'a>, Self::Error>;
}

/// Predicate deciding whether an attempt error should trigger a retry
///
/// Classifiers are pure: they must not keep state between calls. Each
/// classifier has a stable name used for de-duplicated registration and
/// for logging.
pub trait RetryClassifier: Send + Sync {
    /// Stable, unique name of the classifier
    fn name(&self) -> &str;

    /// Whether `err` is a transient condition worth retrying
    fn is_retryable(&self, err: &(dyn StdError + 'static)) -> bool;
}

/// Classifier built from a named predicate
///
/// # Example
///
/// ```
/// use sqltx_core::{FnClassifier, RetryClassifier};
///
/// let classifier = FnClassifier::new("try-again", |err| {
///     err.to_string().to_lowercase().contains("try again")
/// });
/// let err: Box<dyn std::error::Error> = "Please try again".into();
/// assert!(classifier.is_retryable(err.as_ref()));
/// ```
pub struct FnClassifier<F> {
    name: &'static str,
    predicate: F,
}

impl<F> FnClassifier<F>
where
    F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync,
{
    /// Create a classifier from a name and a predicate
    pub fn new(name: &'static str, predicate: F) -> Self {
        Self { name, predicate }
    }
}

impl<F> RetryClassifier for FnClassifier<F>
where
    F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn is_retryable(&self, err: &(dyn StdError + 'static)) -> bool {
        (self.predicate)(err)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier")
            .field("name", &self.name)
            .finish()
    }
}
