//! Error Types
//!
//! Structural errors (`AtomNotFound`, `CyclicDependency`, `DuplicateRef`,
//! `InvalidRule`, ...) abort the operation that raised them and surface to
//! the caller as [`ReactiveError`].
//!
//! Errors raised *inside* reaction and effect handlers are different: they
//! are caught per subscriber, wrapped in a [`HandlerFailure`] and collected
//! into the [`PropagationReport`] of the write or batch flush that triggered
//! them. Sibling subscribers keep running.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Error type returned by reaction and effect handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReactiveError {
    /// Read or write of a name the Origin never declared.
    #[error("atom '{name}' is not declared on origin '{origin}'")]
    AtomNotFound { origin: String, name: String },

    /// A computation re-entered itself while it was still resolving.
    #[error("cyclic dependency detected while resolving '{name}' on origin '{origin}'")]
    CyclicDependency { origin: String, name: String },

    /// The ref is already bound to a different live Origin.
    #[error("ref '{0}' is already bound to a different origin")]
    DuplicateRef(String),

    /// Malformed predicate tree.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// A snapshot names an atom the Origin no longer declares.
    #[error("snapshot atom '{name}' is not declared on origin '{origin}'")]
    RestoreMismatch { origin: String, name: String },

    #[error("origins require a non-empty ref")]
    MissingRef,

    #[error("no origin is registered under ref '{0}'")]
    UnknownRef(String),

    #[error("computed atom '{name}' on origin '{origin}' is read-only")]
    ReadOnly { origin: String, name: String },

    #[error("type mismatch on '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("name '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("history index {index} is out of range (len {len})")]
    HistoryIndex { index: usize, len: usize },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ReactiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ReactiveError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ReactiveError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A handler-level failure isolated to a single subscriber.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Ref of the Origin whose subscriber failed.
    pub origin: String,
    /// Name the reaction or effect was declared under.
    pub subscriber: String,
    /// Rendered error message.
    pub message: String,
    /// Structural error when the failure came from the engine itself
    /// (e.g. a cycle or an unresolvable rule path) rather than user code.
    pub cause: Option<ReactiveError>,
}

impl HandlerFailure {
    pub(crate) fn from_handler(origin: &str, subscriber: &str, err: HandlerError) -> Self {
        // Engine errors bubbling through `?` inside a handler keep their type.
        let cause = err.downcast_ref::<ReactiveError>().cloned();
        Self {
            origin: origin.to_string(),
            subscriber: subscriber.to_string(),
            message: err.to_string(),
            cause,
        }
    }

    pub(crate) fn from_engine(origin: &str, subscriber: &str, err: ReactiveError) -> Self {
        Self {
            origin: origin.to_string(),
            subscriber: subscriber.to_string(),
            message: err.to_string(),
            cause: Some(err),
        }
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}::{}] {}", self.origin, self.subscriber, self.message)
    }
}

/// Outcome of a write, bulk update or batch flush.
///
/// An empty report means every triggered subscriber ran cleanly.
#[derive(Debug, Clone, Default)]
pub struct PropagationReport {
    failures: Vec<HandlerFailure>,
}

impl PropagationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[HandlerFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<HandlerFailure> {
        self.failures
    }

    pub(crate) fn push(&mut self, failure: HandlerFailure) {
        self.failures.push(failure);
    }

    pub(crate) fn merge(&mut self, other: PropagationReport) {
        self.failures.extend(other.failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_failure_keeps_engine_cause() {
        let err: HandlerError = Box::new(ReactiveError::AtomNotFound {
            origin: "u1".into(),
            name: "missing".into(),
        });
        let failure = HandlerFailure::from_handler("u1", "log", err);

        assert_eq!(
            failure.cause,
            Some(ReactiveError::AtomNotFound {
                origin: "u1".into(),
                name: "missing".into(),
            })
        );
        assert!(failure.to_string().starts_with("[u1::log]"));
    }

    #[test]
    fn handler_failure_from_plain_error_has_no_cause() {
        let err: HandlerError = "disk full".into();
        let failure = HandlerFailure::from_handler("u1", "save", err);

        assert!(failure.cause.is_none());
        assert_eq!(failure.message, "disk full");
    }

    #[test]
    fn reports_merge() {
        let mut a = PropagationReport::new();
        assert!(a.is_ok());

        let mut b = PropagationReport::new();
        b.push(HandlerFailure::from_engine("o", "r", ReactiveError::MissingRef));
        a.merge(b);

        assert!(!a.is_ok());
        assert_eq!(a.failures().len(), 1);
    }
}
