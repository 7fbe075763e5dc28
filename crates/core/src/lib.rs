//! Core types and traits for sqltx
//!
//! This crate defines the foundational pieces shared by the retry engine
//! and the driver integrations:
//! - Error: Error taxonomy for transaction runs (`TxError`) and helpers for
//!   walking error source chains
//! - Context: Cancellation signal with optional deadline
//! - TxOptions: Isolation level and read-only hint passed to a beginner
//! - Traits: Capability traits (`Transaction`, `TxBeginner`, `RetryClassifier`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod options;
pub mod traits;

pub use context::{Context, ContextError};
pub use error::{
    error_chain, find_cause, BoxError, CommitError, ConfigError, TxError, TxName, TxResult,
};
pub use options::{IsolationLevel, TxOptions};
pub use traits::{FnClassifier, RetryClassifier, Transaction, TxBeginner};
