//! Retry engine for sqltx
//!
//! This crate runs transaction bodies with automatic retry:
//! - Retry: The orchestrator (`Retrier`, `run`) and its attempt lifecycle
//! - Backoff: Delay schedules (exponential with jitter, constant, zero)
//! - Sleeper: Context-aware pause between attempts
//! - Registry: Retryable-error classifiers contributed by drivers
//! - Config: Explicit `TxConfig`, the frozen process-wide default, and
//!   `sqltx.toml` settings
//!
//! The engine never inspects a driver beyond begin, commit and rollback;
//! everything driver-specific arrives through the `sqltx_core` traits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod config;
pub mod options;
pub mod registry;
pub mod retry;
pub mod sleeper;

pub use backoff::{
    Backoff, BackoffPolicy, Clock, ConstantBackoff, ExponentialBackoff, SystemClock, ZeroBackoff,
};
pub use config::{
    default_max_retries, global_config, init_global, is_global_initialized, register_classifier,
    set_default_backoff, set_default_max_retries, set_default_sleeper, BackoffSettings,
    RetrySettings, TxConfig, CONFIG_FILE_NAME, DEFAULT_MAX_RETRIES,
};
pub use options::Options;
pub use registry::ClassifierRegistry;
pub use retry::{run, Retrier};
pub use sleeper::{DefaultSleeper, NoopSleeper, Sleeper};
