//! Error types for Injecta container operations.
//!
//! Every failure is a programmer error surfaced synchronously at the call
//! that broke the contract: registration checks fail at registration,
//! resolution checks fail at resolution. Nothing is retried.

use std::fmt;

use injecta_support::rendering::render_suggestions;

/// Main error type for all Injecta operations.
#[derive(Debug, thiserror::Error)]
pub enum InjectaError {
    /// Key is missing or normalizes to an empty string.
    #[error("Argument \"key\" after key name normalization is empty (raw key: {raw:?})")]
    InvalidKey { raw: String },

    /// A key derived from a type name is not a usable resolver name.
    #[error(
        "Type `{type_name}` does not yield a plain resolver key\n  Hint: register it with an explicit key instead"
    )]
    InvalidKeyType { type_name: String },

    /// Registration target carries a malformed tag set.
    #[error("Invalid registration shape for {key:?}: {reason}")]
    InvalidRegistrationShape { key: String, reason: &'static str },

    /// Nothing (or the wrong kind of thing) was supplied to resolve.
    #[error("Invalid resolver for {key:?}: {reason}")]
    InvalidResolver { key: String, reason: &'static str },

    /// A lifecycle needing invocation was given a plain value.
    #[error("The resolver registered for {key:?} is not callable, but lifecycle {lifecycle} invokes it")]
    NotCallable { key: String, lifecycle: &'static str },

    /// Factory without transient/singleton, or singleton combined with scoped.
    #[error("Invalid lifecycle combination for {key:?}: {reason}")]
    InvalidLifecycleCombination { key: String, reason: &'static str },

    /// An untagged registration reused an existing key.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// Binding would overwrite an existing owner property.
    #[error("The property {key:?} already exists on the owner\n  Hint: bind with force to overwrite it")]
    PropertyCollision { key: String },

    /// Resolution requested for a key the owner has no binding for.
    #[error("{}", .0)]
    DependencyNotFound(NotFoundError),

    /// Tag filter was an empty string.
    #[error("Invalid tag filter for {key:?}: tags must be non-empty strings")]
    InvalidTagFilter { key: String },

    /// Direct `resolve` for a name nothing was registered under.
    #[error("{}", .0)]
    ResolverNotFound(NotFoundError),

    /// A single resolver was requested for a tagged group, or the reverse.
    #[error("The binding {key:?} is {actual}, not {expected}")]
    BindingKindMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A resolved value was downcast to the wrong type.
    #[error("Type mismatch resolving {key:?}: expected {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// A singleton's creator resolved that same singleton.
    #[error("Singleton {key:?} was resolved again while it was being created")]
    SingletonReentered { key: String },

    /// Constructor or factory failed with a foreign error.
    #[error("Failed to construct {key:?}: {source}")]
    ConstructionFailed {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A setup callback or module failed.
    #[error("Setup of {module} failed: {source}")]
    Setup {
        module: String,
        #[source]
        source: Box<InjectaError>,
    },
}

/// Error when a key has no binding or registration.
///
/// Carries registered keys that look alike, for "did you mean?" hints.
#[derive(Debug)]
pub struct NotFoundError {
    /// The normalized key that was requested
    pub key: String,
    /// Similar keys that ARE registered
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency by key {:?} not registered", self.key)?;
        write!(f, "{}", render_suggestions(&self.suggestions))
    }
}

/// Error when an untagged registration reuses a key.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    pub key: String,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dependency already registered: {:?}", self.key)?;
        write!(
            f,
            "\n  Hint: give every registration sharing a key at least one tag"
        )
    }
}

impl InjectaError {
    /// Wraps a foreign error raised inside a constructor or factory.
    pub fn construction(
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        InjectaError::ConstructionFailed {
            key: key.into(),
            source: source.into(),
        }
    }
}

/// Convenient Result type for Injecta operations.
pub type Result<T> = std::result::Result<T, InjectaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_error_display() {
        let err = InjectaError::ResolverNotFound(NotFoundError {
            key: "sampel".into(),
            suggestions: vec!["sample".into()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("not registered"));
        assert!(msg.contains("sampel"));
        assert!(msg.contains("- sample"));
    }

    #[test]
    fn not_found_without_suggestions() {
        let err = InjectaError::DependencyNotFound(NotFoundError {
            key: "missing".into(),
            suggestions: vec![],
        });

        assert!(!format!("{err}").contains("Did you mean"));
    }

    #[test]
    fn already_registered_display() {
        let err = InjectaError::AlreadyRegistered(AlreadyRegisteredError { key: "sample".into() });
        let msg = format!("{err}");
        assert!(msg.contains("already registered"));
        assert!(msg.contains("tag"));
    }

    #[test]
    fn construction_keeps_source() {
        use std::error::Error;

        let err = InjectaError::construction("user", "database offline");
        assert!(format!("{err}").contains("database offline"));
        assert!(err.source().is_some());
    }
}
