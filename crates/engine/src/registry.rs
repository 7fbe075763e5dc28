//! Retryable-error classifier registry
//!
//! Driver integrations teach the engine their error taxonomy by registering
//! a [`RetryClassifier`]. An attempt error is retryable if any registered
//! classifier accepts it.
//!
//! ## Registration
//!
//! Registration is additive and de-duplicated by classifier name. It is
//! meant to happen once per classifier, during process initialization:
//!
//! ```ignore
//! use sqltx_engine::register_classifier;
//!
//! // Called once at initialization
//! register_classifier(PostgresClassifier)?;
//! ```
//!
//! The process-wide registry is frozen into the global [`TxConfig`] on first
//! use; see [`crate::config`]. A registry can also be built explicitly and
//! handed to a [`Retrier`](crate::Retrier) without touching global state.
//!
//! [`TxConfig`]: crate::TxConfig

use std::error::Error as StdError;
use std::sync::Arc;

use sqltx_core::RetryClassifier;
use tracing::info;

/// Ordered, append-only collection of classifiers
#[derive(Clone, Default)]
pub struct ClassifierRegistry {
    classifiers: Vec<Arc<dyn RetryClassifier>>,
}

impl ClassifierRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a classifier
    ///
    /// Returns `false` without changing the registry when a classifier with
    /// the same name is already registered.
    pub fn register<C: RetryClassifier + 'static>(&mut self, classifier: C) -> bool {
        self.register_arc(Arc::new(classifier))
    }

    /// Register a shared classifier
    pub fn register_arc(&mut self, classifier: Arc<dyn RetryClassifier>) -> bool {
        if self.contains(classifier.name()) {
            return false;
        }
        info!(target: "sqltx::config", name = classifier.name(), "Registered retry classifier");
        self.classifiers.push(classifier);
        true
    }

    /// Builder-style registration
    pub fn with<C: RetryClassifier + 'static>(mut self, classifier: C) -> Self {
        self.register(classifier);
        self
    }

    /// Register every classifier of `other` not already present, keeping order
    pub fn merge(&mut self, other: &ClassifierRegistry) {
        for classifier in &other.classifiers {
            self.register_arc(Arc::clone(classifier));
        }
    }

    /// Whether a classifier with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.classifiers.iter().any(|c| c.name() == name)
    }

    /// Name of the first classifier that accepts `err`, in registration order
    pub fn classify(&self, err: &(dyn StdError + 'static)) -> Option<&str> {
        self.classifiers
            .iter()
            .find(|c| c.is_retryable(err))
            .map(|c| c.name())
    }

    /// Whether any registered classifier accepts `err`
    pub fn is_retryable(&self, err: &(dyn StdError + 'static)) -> bool {
        self.classify(err).is_some()
    }

    /// Number of registered classifiers
    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    /// Whether no classifier is registered
    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }

    /// Names of the registered classifiers, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classifiers.iter().map(|c| c.name())
    }
}

impl std::fmt::Debug for ClassifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
