//! Registration lifecycles and the per-owner scope store.
//!
//! Lifecycles determine how often a registration's creator runs:
//! - [`Lifecycle::Instance`]: never; the registered value is handed out
//! - [`Lifecycle::Transient`]: on every resolution
//! - [`Lifecycle::Singleton`]: once for the whole container
//! - [`Lifecycle::ScopedTransient`]: once per owner (e.g., per request)

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use crate::args::Value;

/// Creation policy of a registration.
///
/// # Examples
/// ```
/// use injecta_container::scope::Lifecycle;
///
/// assert!(Lifecycle::Singleton.is_cached());
/// assert!(!Lifecycle::Transient.is_cached());
/// assert_eq!(Lifecycle::ScopedTransient.to_string(), "ScopedTransient");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// A pre-built value, returned verbatim.
    ///
    /// # When to use
    /// - Configuration objects
    /// - Values built before the container
    Instance,

    /// New instance created on every resolve call.
    ///
    /// Never cached.
    Transient,

    /// One instance shared across the entire container.
    ///
    /// Created on first resolve, from whichever owner asks first.
    Singleton,

    /// One instance per owner.
    ///
    /// Lets two independently registered factories inside one request share
    /// an object without either owning it.
    ScopedTransient,
}

impl Lifecycle {
    /// Returns `true` if the lifecycle keeps created instances.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Lifecycle::Singleton | Lifecycle::ScopedTransient)
    }

    /// Returns `true` if resolving runs a constructor or factory.
    #[inline]
    pub fn invokes_creator(&self) -> bool {
        !matches!(self, Lifecycle::Instance)
    }

    /// Statistics label of the lifecycle's base kind.
    pub fn label(&self) -> &'static str {
        match self {
            Lifecycle::Instance => "instance",
            Lifecycle::Transient | Lifecycle::ScopedTransient => "transient",
            Lifecycle::Singleton => "singleton",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Instance => write!(f, "Instance"),
            Lifecycle::Transient => write!(f, "Transient"),
            Lifecycle::Singleton => write!(f, "Singleton"),
            Lifecycle::ScopedTransient => write!(f, "ScopedTransient"),
        }
    }
}

/// Per-owner cache backing [`Lifecycle::ScopedTransient`].
///
/// Created with the owner and dropped with it; entries are never pruned
/// before that. Scope keys are registration keys.
#[derive(Default)]
pub struct ScopeStore {
    values: Mutex<HashMap<String, Value>>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value previously stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    /// Stores `value` unless `key` is already taken; returns whichever value
    /// ends up stored.
    ///
    /// The lock is not held while creators run, so a creator that reenters
    /// the same scoped key stores first and wins.
    pub fn get_or_store(&self, key: &str, value: Value) -> Value {
        self.values
            .lock()
            .entry(key.to_string())
            .or_insert(value)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl fmt::Debug for ScopeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.lock();
        let mut keys: Vec<&String> = values.keys().collect();
        keys.sort();
        f.debug_struct("ScopeStore").field("keys", &keys).finish()
    }
}
