//! Owners and the binder that fills them with resolvers.
//!
//! An [`Owner`] is the per-request resolution context: the host's own
//! properties, one binding per registered key, and the owner's
//! [`ScopeStore`]. [`bind`] fills it in one pass; the owner's
//! [`resolver`](Owner::resolver) and [`group`](Owner::group) accessors hand
//! out resolvers bound to it.
//!
//! ```text
//! Registry ──bind(owner)──> Owner { req, sample, user, handler[..] }
//!                              │
//!                        owner.resolver("user")?.call(args)
//!                              │
//!                              ▼
//!                        lifecycle::resolve(entry, owner, args)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use injecta_support::rendering::suggest_similar;
use tracing::{debug, instrument, warn};

use crate::args::{Args, Value, downcast};
use crate::error::{InjectaError, NotFoundError, Result};
use crate::lifecycle;
use crate::registry::{Entry, Registry, Slot};
use crate::scope::{Lifecycle, ScopeStore};

/// Own property of an owner.
#[derive(Clone)]
pub enum Property {
    /// A plain value the host put there (e.g. the request).
    Value(Value),
    /// Resolver of an untagged registration.
    Resolver(Arc<Entry>),
    /// Resolver-group accessor of a tagged key.
    Group(Arc<[Arc<Entry>]>),
}

impl Property {
    fn kind(&self) -> &'static str {
        match self {
            Property::Value(_) => "a plain value",
            Property::Resolver(_) => "a resolver",
            Property::Group(_) => "a tagged resolver group",
        }
    }
}

/// Per-owner resolution context.
///
/// # Examples
/// ```
/// use injecta_container::binder::Owner;
///
/// struct Request { path: String }
///
/// let owner = Owner::new().with("req", Request { path: "/users".into() });
/// assert_eq!(owner.value::<Request>("req").unwrap().path, "/users");
/// ```
#[derive(Default)]
pub struct Owner {
    properties: HashMap<String, Property>,
    scope: ScopeStore,
}

impl Owner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner carrying the host request under the `req` property.
    pub fn for_request<R: Send + Sync + 'static>(request: R) -> Self {
        Self::new().with("req", request)
    }

    /// Adds a plain property, replacing any previous one.
    pub fn with<T: Send + Sync + 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a plain property, returning the property it replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) -> Option<Property> {
        self.properties.insert(key.into(), Property::Value(Arc::new(value)))
    }

    /// `true` if the owner has an own property (of any kind) named `key`.
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Plain property downcast to `T`.
    pub fn value<T: 'static>(&self, key: &str) -> Option<&T> {
        match self.properties.get(key)? {
            Property::Value(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// The owner's scoped-transient cache.
    pub fn scope(&self) -> &ScopeStore {
        &self.scope
    }

    /// Property names, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.properties.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    fn lookup(&self, key: &str) -> Result<(&str, &Property)> {
        self.properties.get_key_value(key).map(|(k, p)| (k.as_str(), p)).ok_or_else(|| {
            let keys = self.keys();
            InjectaError::DependencyNotFound(NotFoundError {
                key: key.to_string(),
                suggestions: suggest_similar(key, &keys, 3),
            })
        })
    }

    /// Resolver bound to this owner for an untagged key.
    ///
    /// # Errors
    /// - [`InjectaError::DependencyNotFound`]: no such property
    /// - [`InjectaError::BindingKindMismatch`]: the property is a plain
    ///   value or a tagged group
    pub fn resolver(&self, key: &str) -> Result<Resolver<'_>> {
        match self.lookup(key)?.1 {
            Property::Resolver(entry) => Ok(Resolver { owner: self, entry }),
            other => Err(InjectaError::BindingKindMismatch {
                key: key.to_string(),
                expected: "a resolver",
                actual: other.kind(),
            }),
        }
    }

    /// Resolver-group accessor bound to this owner for a tagged key.
    pub fn group(&self, key: &str) -> Result<ResolverGroup<'_>> {
        match self.lookup(key)? {
            (key, Property::Group(entries)) => Ok(ResolverGroup {
                owner: self,
                key,
                entries,
            }),
            (key, other) => Err(InjectaError::BindingKindMismatch {
                key: key.to_string(),
                expected: "a tagged resolver group",
                actual: other.kind(),
            }),
        }
    }

    /// Shorthand for `resolver(key)?.get::<T>(args)`.
    pub fn resolve<T: Send + Sync + 'static>(&self, key: &str, args: Args) -> Result<Arc<T>> {
        self.resolver(key)?.get(args)
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("properties", &self.keys())
            .field("scope", &self.scope)
            .finish()
    }
}

/// A resolver bound to one owner and one registration.
#[derive(Clone, Copy)]
pub struct Resolver<'o> {
    owner: &'o Owner,
    entry: &'o Arc<Entry>,
}

impl<'o> Resolver<'o> {
    /// Resolves with call-time arguments appended to the static ones.
    pub fn call(&self, args: Args) -> Result<Value> {
        lifecycle::resolve(self.entry, self.owner, &args)
    }

    /// [`call`](Self::call), downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, args: Args) -> Result<Arc<T>> {
        downcast(&self.entry.key, self.call(args)?)
    }

    pub fn key(&self) -> &'o str {
        &self.entry.key
    }

    pub fn tags(&self) -> &'o [String] {
        &self.entry.tags
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.entry.lifecycle
    }
}

impl fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("key", &self.entry.key)
            .field("tags", &self.entry.tags)
            .field("lifecycle", &self.entry.lifecycle)
            .finish()
    }
}

/// Tag selection for a [`ResolverGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TagFilter {
    /// Every entry.
    #[default]
    All,
    /// Entries carrying this tag.
    One(String),
    /// Entries carrying at least one of these tags.
    AnyOf(Vec<String>),
}

impl TagFilter {
    fn validate(&self, key: &str) -> Result<()> {
        let invalid = match self {
            TagFilter::All => false,
            TagFilter::One(tag) => tag.is_empty(),
            TagFilter::AnyOf(tags) => tags.iter().any(String::is_empty),
        };
        if invalid {
            return Err(InjectaError::InvalidTagFilter { key: key.to_string() });
        }
        Ok(())
    }

    fn admits(&self, entry: &Entry) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::One(tag) => entry.tags.contains(tag),
            TagFilter::AnyOf(tags) => entry.matches_any(tags),
        }
    }
}

impl From<&str> for TagFilter {
    fn from(tag: &str) -> Self {
        TagFilter::One(tag.to_string())
    }
}

impl From<String> for TagFilter {
    fn from(tag: String) -> Self {
        TagFilter::One(tag)
    }
}

impl From<Option<&str>> for TagFilter {
    fn from(tag: Option<&str>) -> Self {
        tag.map_or(TagFilter::All, TagFilter::from)
    }
}

impl From<&[&str]> for TagFilter {
    fn from(tags: &[&str]) -> Self {
        TagFilter::AnyOf(tags.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for TagFilter {
    fn from(tags: [&str; N]) -> Self {
        TagFilter::AnyOf(tags.iter().map(|t| t.to_string()).collect())
    }
}

impl From<Vec<String>> for TagFilter {
    fn from(tags: Vec<String>) -> Self {
        TagFilter::AnyOf(tags)
    }
}

/// Accessor for the entries of a tagged key.
///
/// Returns per-entry resolvers without invoking them, so a caller can
/// materialize one, some or all variants, each with its own arguments.
#[derive(Clone, Copy)]
pub struct ResolverGroup<'o> {
    owner: &'o Owner,
    key: &'o str,
    entries: &'o [Arc<Entry>],
}

impl<'o> ResolverGroup<'o> {
    /// Resolvers of the entries admitted by `filter`, in registration order.
    ///
    /// # Errors
    /// [`InjectaError::InvalidTagFilter`] if the filter holds an empty tag.
    pub fn resolvers(&self, filter: impl Into<TagFilter>) -> Result<Vec<Resolver<'o>>> {
        let filter = filter.into();
        filter.validate(self.key)?;
        Ok(self
            .entries
            .iter()
            .filter(|entry| filter.admits(entry))
            .map(|entry| Resolver {
                owner: self.owner,
                entry,
            })
            .collect())
    }

    /// Resolvers of every entry, in registration order.
    pub fn all(&self) -> Vec<Resolver<'o>> {
        self.entries
            .iter()
            .map(|entry| Resolver {
                owner: self.owner,
                entry,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ResolverGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverGroup")
            .field("key", &self.key)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Attaches one resolver (or resolver group) per registered key to `owner`.
///
/// The owner gets a fresh [`ScopeStore`]. Collisions are checked for every
/// key before anything is attached, so a failed bind leaves the owner as
/// it was.
///
/// # Errors
/// - [`InjectaError::PropertyCollision`]: `owner` already has a property
///   named like a registered key and `force` is false
/// - [`InjectaError::DependencyNotFound`]: a registry key without a slot
#[instrument(skip_all, fields(keys = registry.len(), force = force))]
pub fn bind(owner: &mut Owner, registry: &Registry, force: bool) -> Result<()> {
    let mut properties = Vec::with_capacity(registry.len());

    for (key, slot) in registry.iter() {
        if !force && owner.has_property(key) {
            warn!(key = %key, "Binding would overwrite an owner property");
            return Err(InjectaError::PropertyCollision { key: key.to_string() });
        }

        let property = match slot {
            Some(Slot::Single(entry)) => Property::Resolver(entry.clone()),
            Some(Slot::Group(entries)) => Property::Group(entries.iter().cloned().collect()),
            None => {
                return Err(InjectaError::DependencyNotFound(NotFoundError {
                    key: key.to_string(),
                    suggestions: Vec::new(),
                }));
            }
        };
        properties.push((key.to_string(), property));
    }

    owner.scope = ScopeStore::new();
    owner.properties.extend(properties);
    debug!(bound = registry.len(), "Resolvers bound to owner");
    Ok(())
}

/// A resolver that owns its (throwaway) owner.
///
/// Returned by the direct resolution helpers, which have no request to
/// bind into.
pub struct DetachedResolver {
    owner: Owner,
    key: String,
}

impl DetachedResolver {
    pub(crate) fn new(owner: Owner, key: String) -> Self {
        Self { owner, key }
    }

    /// Resolves with call-time arguments.
    pub fn call(&self, args: Args) -> Result<Value> {
        self.owner.resolver(&self.key)?.call(args)
    }

    /// [`call`](Self::call), downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, args: Args) -> Result<Arc<T>> {
        self.owner.resolver(&self.key)?.get(args)
    }

    /// Resolver-group accessor, for tagged names.
    pub fn group(&self) -> Result<ResolverGroup<'_>> {
        self.owner.group(&self.key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The owner this resolver is bound to.
    pub fn owner(&self) -> &Owner {
        &self.owner
    }
}

impl fmt::Debug for DetachedResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetachedResolver").field("key", &self.key).finish()
    }
}
