//! Retry configuration: explicit config objects, the process-wide default,
//! and `sqltx.toml` settings files
//!
//! # Initialization Phase
//!
//! Process-wide defaults (max retries, backoff policy, sleeper, classifier
//! registry) may only be changed during a single initialization phase. The
//! phase ends the first time the global configuration is used by
//! [`global_config`] (every call to the free [`run`](crate::run) function
//! does this) or installed with [`init_global`]. From then on the global
//! [`TxConfig`] is immutable and every mutator returns
//! [`ConfigError::AlreadyInitialized`].
//!
//! Callers who want no global state at all build a [`TxConfig`] themselves
//! and hand it to a [`Retrier`](crate::Retrier).
//!
//! # Settings File
//!
//! ```toml
//! # Maximum attempts per transaction (default: 20)
//! max_retries = 20
//!
//! [backoff]
//! initial_interval_ms = 1
//! max_interval_ms = 60000
//! multiplier = 1.5
//! randomization_factor = 0.5
//! # 0 disables the elapsed-time ceiling
//! max_elapsed_time_ms = 5000
//! ```

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqltx_core::{ConfigError, RetryClassifier};
use tracing::info;

use crate::backoff::{
    BackoffPolicy, ExponentialBackoff, DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_ELAPSED_TIME,
    DEFAULT_MAX_INTERVAL, DEFAULT_MULTIPLIER, DEFAULT_RANDOMIZATION_FACTOR,
};
use crate::registry::ClassifierRegistry;
use crate::sleeper::{DefaultSleeper, Sleeper};

/// Default number of attempts per transaction
pub const DEFAULT_MAX_RETRIES: usize = 20;

/// Settings file name
pub const CONFIG_FILE_NAME: &str = "sqltx.toml";

fn default_retry_limit() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_MAX_RETRIES).unwrap_or(NonZeroUsize::MIN)
}

// ============================================================================
// TxConfig
// ============================================================================

/// Process-level retry configuration
///
/// Holds the defaults a run falls back to when its
/// [`Options`](crate::Options) leave a field unset, plus the classifier
/// registry that decides which errors are retried.
#[derive(Debug, Clone)]
pub struct TxConfig {
    max_retries: NonZeroUsize,
    backoff: Arc<dyn BackoffPolicy>,
    sleeper: Arc<dyn Sleeper>,
    classifiers: ClassifierRegistry,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            max_retries: default_retry_limit(),
            backoff: Arc::new(ExponentialBackoff::new()),
            sleeper: Arc::new(DefaultSleeper),
            classifiers: ClassifierRegistry::new(),
        }
    }
}

impl TxConfig {
    /// Configuration with default retry count, backoff and sleeper and an
    /// empty classifier registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default attempt limit
    pub fn with_max_retries(mut self, retries: NonZeroUsize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the default backoff policy
    pub fn with_backoff<P: BackoffPolicy + 'static>(mut self, policy: P) -> Self {
        self.backoff = Arc::new(policy);
        self
    }

    /// Set the default sleeper
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Register a classifier
    pub fn with_classifier<C: RetryClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifiers.register(classifier);
        self
    }

    /// Replace the classifier registry
    pub fn with_classifiers(mut self, classifiers: ClassifierRegistry) -> Self {
        self.classifiers = classifiers;
        self
    }

    /// Default attempt limit
    pub fn max_retries(&self) -> NonZeroUsize {
        self.max_retries
    }

    /// Default backoff policy
    pub fn backoff(&self) -> &Arc<dyn BackoffPolicy> {
        &self.backoff
    }

    /// Default sleeper
    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    /// Classifier registry
    pub fn classifiers(&self) -> &ClassifierRegistry {
        &self.classifiers
    }

    /// Mutable classifier registry
    pub fn classifiers_mut(&mut self) -> &mut ClassifierRegistry {
        &mut self.classifiers
    }
}

// ============================================================================
// Global Configuration
// ============================================================================
//
// PENDING collects changes during the initialization phase. GLOBAL is set
// exactly once, from PENDING or from `init_global`. Every path that may set
// GLOBAL takes the PENDING lock first and only then touches GLOBAL, so a
// registration is either part of the frozen config or rejected, never lost.
// Never take PENDING inside a GLOBAL initializer.

static PENDING: Lazy<Mutex<TxConfig>> = Lazy::new(|| Mutex::new(TxConfig::default()));

static GLOBAL: OnceCell<Arc<TxConfig>> = OnceCell::new();

fn with_pending<R>(f: impl FnOnce(&mut TxConfig) -> R) -> Result<R, ConfigError> {
    let mut pending = PENDING.lock();
    if GLOBAL.get().is_some() {
        return Err(ConfigError::AlreadyInitialized);
    }
    Ok(f(&mut pending))
}

/// Register a classifier with the process-wide registry
///
/// Returns `Ok(false)` if a classifier with the same name is already
/// registered.
///
/// # Errors
///
/// Returns [`ConfigError::AlreadyInitialized`] once the global
/// configuration is frozen.
pub fn register_classifier<C: RetryClassifier + 'static>(classifier: C) -> Result<bool, ConfigError> {
    with_pending(|config| config.classifiers.register(classifier))
}

/// Set the process-wide default attempt limit
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for zero and
/// [`ConfigError::AlreadyInitialized`] once the global configuration is
/// frozen.
pub fn set_default_max_retries(retries: usize) -> Result<(), ConfigError> {
    let retries = NonZeroUsize::new(retries)
        .ok_or_else(|| ConfigError::invalid("max_retries must be greater than zero"))?;
    with_pending(|config| config.max_retries = retries)
}

/// The process-wide default attempt limit
pub fn default_max_retries() -> usize {
    match GLOBAL.get() {
        Some(config) => config.max_retries.get(),
        None => PENDING.lock().max_retries.get(),
    }
}

/// Set the process-wide default backoff policy
///
/// # Errors
///
/// Returns [`ConfigError::AlreadyInitialized`] once the global
/// configuration is frozen.
pub fn set_default_backoff<P: BackoffPolicy + 'static>(policy: P) -> Result<(), ConfigError> {
    with_pending(|config| config.backoff = Arc::new(policy))
}

/// Set the process-wide default sleeper
///
/// # Errors
///
/// Returns [`ConfigError::AlreadyInitialized`] once the global
/// configuration is frozen.
pub fn set_default_sleeper<S: Sleeper + 'static>(sleeper: S) -> Result<(), ConfigError> {
    with_pending(|config| config.sleeper = Arc::new(sleeper))
}

/// Install `config` as the process-wide configuration and freeze it
///
/// Classifiers already registered through [`register_classifier`] are
/// appended after the classifiers of `config`.
///
/// # Errors
///
/// Returns [`ConfigError::AlreadyInitialized`] if the global configuration
/// was already frozen.
pub fn init_global(mut config: TxConfig) -> Result<Arc<TxConfig>, ConfigError> {
    let pending = PENDING.lock();
    if GLOBAL.get().is_some() {
        return Err(ConfigError::AlreadyInitialized);
    }
    config.classifiers.merge(&pending.classifiers);
    let config = Arc::new(config);
    GLOBAL
        .set(Arc::clone(&config))
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    info!(
        target: "sqltx::config",
        max_retries = config.max_retries.get(),
        classifiers = config.classifiers.len(),
        "Installed global transaction config"
    );
    Ok(config)
}

/// The process-wide configuration, freezing it on first call
pub fn global_config() -> Arc<TxConfig> {
    if let Some(config) = GLOBAL.get() {
        return Arc::clone(config);
    }
    // PENDING before GLOBAL, the same order as `init_global`
    let pending = PENDING.lock();
    Arc::clone(GLOBAL.get_or_init(|| {
        info!(
            target: "sqltx::config",
            max_retries = pending.max_retries.get(),
            classifiers = pending.classifiers.len(),
            "Froze global transaction config"
        );
        Arc::new(pending.clone())
    }))
}

/// Whether the process-wide configuration is frozen
pub fn is_global_initialized() -> bool {
    GLOBAL.get().is_some()
}

// ============================================================================
// Settings File
// ============================================================================

/// Backoff section of `sqltx.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSettings {
    /// First retry interval in milliseconds
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Cap for a single interval in milliseconds
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Growth factor between attempts
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter factor in `[0, 1]`
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
    /// Overall retry budget in milliseconds; 0 disables it
    #[serde(default = "default_max_elapsed_time_ms")]
    pub max_elapsed_time_ms: u64,
}

fn default_initial_interval_ms() -> u64 {
    DEFAULT_INITIAL_INTERVAL.as_millis() as u64
}

fn default_max_interval_ms() -> u64 {
    DEFAULT_MAX_INTERVAL.as_millis() as u64
}

fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}

fn default_randomization_factor() -> f64 {
    DEFAULT_RANDOMIZATION_FACTOR
}

fn default_max_elapsed_time_ms() -> u64 {
    DEFAULT_MAX_ELAPSED_TIME.as_millis() as u64
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            randomization_factor: default_randomization_factor(),
            max_elapsed_time_ms: default_max_elapsed_time_ms(),
        }
    }
}

impl BackoffSettings {
    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_interval_ms == 0 {
            return Err(ConfigError::invalid("backoff.initial_interval_ms must be > 0"));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(ConfigError::invalid(
                "backoff.max_interval_ms must be >= backoff.initial_interval_ms",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid("backoff.multiplier must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(ConfigError::invalid(
                "backoff.randomization_factor must be within [0, 1]",
            ));
        }
        Ok(())
    }

    /// Build the exponential policy described by these settings
    pub fn to_policy(&self) -> ExponentialBackoff {
        let max_elapsed = match self.max_elapsed_time_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        ExponentialBackoff::new()
            .with_initial_interval(Duration::from_millis(self.initial_interval_ms))
            .with_max_interval(Duration::from_millis(self.max_interval_ms))
            .with_multiplier(self.multiplier)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(max_elapsed)
    }
}

/// Contents of `sqltx.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum attempts per transaction
    #[serde(default = "default_max_retries_value")]
    pub max_retries: usize,
    /// Backoff policy parameters
    #[serde(default)]
    pub backoff: BackoffSettings,
}

fn default_max_retries_value() -> usize {
    DEFAULT_MAX_RETRIES
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffSettings::default(),
        }
    }
}

impl RetrySettings {
    /// Returns the default settings file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# sqltx retry configuration
#
# Maximum attempts per transaction (default: 20)
max_retries = 20

[backoff]
# First retry interval (default: 1ms)
initial_interval_ms = 1
# Cap for a single interval (default: 60s)
max_interval_ms = 60000
# Growth factor between attempts (default: 1.5)
multiplier = 1.5
# Jitter: intervals are drawn from cur +/- cur * factor (default: 0.5)
randomization_factor = 0.5
# Overall retry budget; 0 disables it (default: 5s)
max_elapsed_time_ms = 5000
"#
    }

    /// Parse and validate settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or holds invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: RetrySettings =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse settings from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse(msg) => {
                ConfigError::Parse(format!("'{}': {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Write the default settings file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize these settings to TOML and write them to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries must be greater than zero"));
        }
        self.backoff.validate()
    }

    /// Apply these settings to an explicit configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the settings are out of range.
    pub fn apply(&self, config: TxConfig) -> Result<TxConfig, ConfigError> {
        self.validate()?;
        let retries = NonZeroUsize::new(self.max_retries)
            .ok_or_else(|| ConfigError::invalid("max_retries must be greater than zero"))?;
        Ok(config
            .with_max_retries(retries)
            .with_backoff(self.backoff.to_policy()))
    }

    /// Apply these settings to the process-wide defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the settings are out of range and
    /// [`ConfigError::AlreadyInitialized`] once the global configuration is
    /// frozen.
    pub fn install_defaults(&self) -> Result<(), ConfigError> {
        self.validate()?;
        set_default_max_retries(self.max_retries)?;
        set_default_backoff(self.backoff.to_policy())
    }
}
