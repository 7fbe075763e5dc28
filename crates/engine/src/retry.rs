//! Transaction retry orchestrator
//!
//! Runs a caller-supplied transaction body with automatic retry on
//! transient, server-reported conflicts.
//!
//! ## Attempt Lifecycle
//!
//! 1. Begin a fresh transaction through the [`TxBeginner`]. Begin failures
//!    are returned immediately and never retried.
//! 2. Run the body with the handle. On success, commit.
//! 3. On a body or commit error, roll the handle back (best-effort) and ask
//!    the classifier registry whether the error is retryable.
//! 4. Non-retryable errors are returned as they are. Retryable errors
//!    consult the run's backoff schedule, sleep, and start the next attempt.
//!
//! Attempts are strictly sequential: attempt N+1 begins only after the
//! handle of attempt N was committed or rolled back. A handle is rolled
//! back on every non-success exit, including a panic in the body, in which
//! case the panic continues unchanged after the rollback.

use std::sync::Arc;

use sqltx_core::{
    BoxError, CommitError, Context, Transaction, TxBeginner, TxError, TxResult,
};
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::config::{global_config, TxConfig};
use crate::options::Options;

// ============================================================================
// Attempt Guard
// ============================================================================

/// Owns the handle of one attempt and rolls it back unless it committed
///
/// Dropping the guard on any path other than a successful commit (error
/// return, failed commit, unwinding panic) performs the rollback, so
/// cleanup does not depend on each exit path remembering to do it.
struct AttemptGuard<X: Transaction> {
    tx: X,
    committed: bool,
}

impl<X: Transaction> AttemptGuard<X> {
    fn new(tx: X) -> Self {
        Self {
            tx,
            committed: false,
        }
    }

    fn commit(&mut self) -> Result<(), X::Error> {
        self.tx.commit()?;
        self.committed = true;
        Ok(())
    }
}

impl<X: Transaction> Drop for AttemptGuard<X> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if std::thread::panicking() {
            warn!(target: "sqltx::tx", "Rolling back transaction after panic in body");
        }
        if let Err(e) = self.tx.rollback() {
            debug!(target: "sqltx::tx", error = %e, "Rollback failed; ignoring");
        }
    }
}

/// Run the body against one handle and commit it
///
/// Returns the body's value, or the attempt error (body error, or the
/// commit error wrapped in [`CommitError`]) after the handle was rolled back.
fn run_attempt<X, F, T, E>(tx: X, body: &mut F) -> Result<T, BoxError>
where
    X: Transaction,
    F: FnMut(&mut X) -> Result<T, E>,
    E: Into<BoxError>,
{
    let mut guard = AttemptGuard::new(tx);
    let value = body(&mut guard.tx).map_err(Into::into)?;
    guard
        .commit()
        .map_err(|e| Box::new(CommitError(Box::new(e))) as BoxError)?;
    Ok(value)
}

// ============================================================================
// Retrier
// ============================================================================

/// Executes transaction bodies with retry, using an explicit configuration
///
/// # Example
/// ```ignore
/// let config = TxConfig::new().with_classifier(PostgresClassifier);
/// let retrier = Retrier::new(Arc::new(config));
///
/// let moved = retrier.run(&ctx, &db, &Options::new().name("transfer"), |tx| {
///     tx.execute("UPDATE accounts SET balance = balance - 10 WHERE id = 1", [])?;
///     tx.execute("UPDATE accounts SET balance = balance + 10 WHERE id = 2", [])
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct Retrier {
    config: Arc<TxConfig>,
}

impl Retrier {
    /// Create a retrier backed by `config`
    pub fn new(config: Arc<TxConfig>) -> Self {
        Self { config }
    }

    /// Create a retrier backed by the process-wide configuration
    ///
    /// This freezes the global configuration.
    pub fn global() -> Self {
        Self::new(global_config())
    }

    /// The configuration in use
    pub fn config(&self) -> &TxConfig {
        &self.config
    }

    /// Run `body` in a transaction, retrying on retryable errors
    ///
    /// The body may be called several times, each time with a fresh handle,
    /// so it must not leave side effects outside the transaction that would
    /// be wrong to repeat.
    ///
    /// # Errors
    ///
    /// - [`TxError::Begin`] if a transaction could not be started or `ctx`
    ///   was done before an attempt
    /// - [`TxError::Failed`] if the body or commit failed with an error no
    ///   classifier accepts
    /// - [`TxError::BackoffExhausted`] if the backoff schedule stopped
    /// - [`TxError::RetriesExhausted`] if every attempt failed
    ///
    /// # Panics
    ///
    /// Panics if the configuration has no classifiers registered. Panics
    /// raised by the body propagate unchanged after the handle is rolled
    /// back.
    pub fn run<'b, B, F, T, E>(
        &self,
        ctx: &Context,
        beginner: &'b B,
        options: &Options,
        mut body: F,
    ) -> TxResult<T>
    where
        B: TxBeginner + 'b,
        F: FnMut(&mut B::Tx<'b>) -> Result<T, E>,
        E: Into<BoxError>,
    {
        let registry = self.config.classifiers();
        if registry.is_empty() {
            panic!(
                "no sqltx retry classifiers registered; register the classifier of your \
                 database driver (for example register_postgres_classifier()) before running \
                 transactions"
            );
        }

        let name = options.tx_name();
        let retries = options
            .retry_limit()
            .unwrap_or_else(|| self.config.max_retries().get());
        let policy = options.backoff.as_ref().unwrap_or(self.config.backoff());
        let sleeper = options.sleeper.as_ref().unwrap_or(self.config.sleeper());
        let tx_opts = options.tx_options();

        // Armed on the first retryable failure and kept for the whole run
        let mut backoff: Option<Box<dyn Backoff>> = None;
        let mut last_error: Option<BoxError> = None;

        for attempt in 1..=retries {
            if let Some(reason) = ctx.err() {
                return Err(TxError::Begin {
                    name,
                    source: Box::new(reason),
                });
            }

            let tx = beginner
                .begin_tx(ctx, &tx_opts)
                .map_err(|e| TxError::Begin {
                    name: name.clone(),
                    source: Box::new(e),
                })?;
            debug!(target: "sqltx::tx", name = ?name.as_str(), attempt, "Transaction started");

            let err = match run_attempt(tx, &mut body) {
                Ok(value) => {
                    debug!(target: "sqltx::tx", name = ?name.as_str(), attempt, "Transaction committed");
                    return Ok(value);
                }
                Err(err) => err,
            };

            let classifier = match registry.classify(&*err) {
                Some(classifier) => classifier,
                None => {
                    debug!(
                        target: "sqltx::tx",
                        name = ?name.as_str(),
                        attempt,
                        error = %err,
                        "Non-retryable transaction error"
                    );
                    return Err(TxError::Failed { name, source: err });
                }
            };

            if attempt == retries {
                last_error = Some(err);
                break;
            }

            let schedule = backoff.get_or_insert_with(|| policy.new_backoff());
            let delay = match schedule.next_backoff() {
                Some(delay) => delay,
                None => {
                    warn!(
                        target: "sqltx::tx",
                        name = ?name.as_str(),
                        attempt,
                        error = %err,
                        "Transaction backoff budget exhausted"
                    );
                    return Err(TxError::BackoffExhausted {
                        name,
                        attempts: attempt,
                        source: err,
                    });
                }
            };

            warn!(
                target: "sqltx::tx",
                name = ?name.as_str(),
                attempt,
                classifier,
                delay = ?delay,
                error = %err,
                "Retryable transaction error, retrying"
            );
            last_error = Some(err);
            sleeper.sleep(ctx, delay);
        }

        warn!(target: "sqltx::tx", name = ?name.as_str(), retries, "Transaction retry count exhausted");
        Err(TxError::RetriesExhausted {
            name,
            retries,
            // The loop runs at least once, so an error was always recorded.
            source: last_error.unwrap_or_else(|| "retry loop exited without an attempt".into()),
        })
    }
}

/// Run `body` in a transaction using the process-wide configuration
///
/// Equivalent to `Retrier::global().run(..)`. The first call freezes the
/// global configuration.
///
/// # Errors
///
/// See [`Retrier::run`].
///
/// # Panics
///
/// Panics if no classifier was registered before the first call.
pub fn run<'b, B, F, T, E>(
    ctx: &Context,
    beginner: &'b B,
    options: &Options,
    body: F,
) -> TxResult<T>
where
    B: TxBeginner + 'b,
    F: FnMut(&mut B::Tx<'b>) -> Result<T, E>,
    E: Into<BoxError>,
{
    Retrier::global().run(ctx, beginner, options, body)
}
