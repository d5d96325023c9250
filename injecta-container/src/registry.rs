//! Dependency registry: stores every registration of a container.
//!
//! The registry maps canonical keys to a single [`Entry`] or, once tags
//! come into play, to an ordered group of entries. It is populated during
//! setup and only read afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::args::{Args, Value};
use crate::error::{AlreadyRegisteredError, InjectaError, Result};
use crate::key::{KeyNormalizer, RegistrationTarget};
use crate::lifecycle::Invocation;
use crate::scope::Lifecycle;
use crate::stats::{StatisticsCollector, registration_labels};

/// Type alias for creator functions.
///
/// A creator receives the [`Invocation`] (owner, combined arguments, bound
/// context) and returns the created value or an error.
pub type CreateFn = Arc<dyn Fn(&Invocation<'_>) -> Result<Value> + Send + Sync>;

/// What a registration resolves to.
#[derive(Clone)]
pub enum Resolvable {
    /// A pre-built value. Only valid for [`Lifecycle::Instance`].
    Value(Value),
    /// A constructor, invoked as an allocator: no bound context.
    Constructor(CreateFn),
    /// A factory function, invoked directly with an optional bound context.
    Factory {
        create: CreateFn,
        context: Option<Value>,
    },
}

impl Resolvable {
    /// Factory returning an erased value as-is, so it can hand out a value
    /// obtained from another resolver without wrapping it again.
    pub fn factory_value<F>(factory: F, context: Option<Value>) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Resolvable::Factory {
            create: Arc::new(factory),
            context,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Resolvable::Value(_) => "value",
            Resolvable::Constructor(_) => "constructor",
            Resolvable::Factory { .. } => "factory",
        }
    }
}

/// A registration request before validation.
///
/// The typed `register_*` methods of [`Container`](crate::container::Container)
/// build these; it is public for hosts that assemble registrations at
/// runtime.
#[derive(Clone)]
pub struct Registration {
    pub target: RegistrationTarget,
    /// `Instance`, `Transient` or `Singleton`; `ScopedTransient` implies `scoped`.
    pub lifecycle: Lifecycle,
    pub scoped: bool,
    pub resolvable: Option<Resolvable>,
    pub static_args: Args,
}

impl Registration {
    pub fn new(target: impl Into<RegistrationTarget>, lifecycle: Lifecycle, resolvable: Resolvable) -> Self {
        Self {
            target: target.into(),
            lifecycle,
            scoped: false,
            resolvable: Some(resolvable),
            static_args: Args::new(),
        }
    }

    pub fn scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }

    pub fn static_args(mut self, args: Args) -> Self {
        self.static_args = args;
        self
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("target", &self.target)
            .field("lifecycle", &self.lifecycle)
            .field("scoped", &self.scoped)
            .field("resolvable", &self.resolvable.as_ref().map(Resolvable::kind))
            .field("static_args", &self.static_args)
            .finish()
    }
}

/// Holds the one instance of a singleton registration.
///
/// `OnceCell` doubles as the in-flight marker: concurrent first
/// resolutions block until the winner has stored its value. The creating
/// thread is remembered so that a creator resolving its own singleton
/// fails instead of blocking on itself.
#[derive(Default)]
pub(crate) struct SingletonCache {
    cell: OnceCell<Value>,
    creator: Mutex<Option<ThreadId>>,
}

/// Clears the creator mark, also when the creator panics.
struct CreatorMark<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for CreatorMark<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

impl SingletonCache {
    /// Returns the cached value, creating it first if needed. The flag is
    /// `true` when this call created it.
    ///
    /// # Errors
    /// [`InjectaError::SingletonReentered`] if called from inside this
    /// singleton's own creator; otherwise whatever `create` fails with.
    pub fn get_or_create(&self, key: &str, create: impl FnOnce() -> Result<Value>) -> Result<(Value, bool)> {
        if let Some(value) = self.cell.get() {
            return Ok((value.clone(), false));
        }

        let current = thread::current().id();
        if *self.creator.lock() == Some(current) {
            warn!(key = %key, "Singleton resolved from its own creator");
            return Err(InjectaError::SingletonReentered { key: key.to_string() });
        }

        let mut created = false;
        let value = self.cell.get_or_try_init(|| {
            *self.creator.lock() = Some(current);
            let _mark = CreatorMark(&self.creator);
            created = true;
            create()
        })?;
        Ok((value.clone(), created))
    }

    pub fn is_created(&self) -> bool {
        self.cell.get().is_some()
    }
}

pub(crate) enum Source {
    Value(Value),
    Create(CreateFn),
}

/// One validated registration. Immutable once registered.
pub struct Entry {
    pub(crate) key: String,
    /// Slot of this entry in an owner's scope store. Equal to `key` unless
    /// the entry is tagged, where it also carries the position in the group.
    pub(crate) scope_key: String,
    pub(crate) tags: Vec<String>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) is_factory: bool,
    pub(crate) static_args: Args,
    pub(crate) bound_context: Option<Value>,
    pub(crate) source: Source,
    pub(crate) singleton: Option<SingletonCache>,
    pub(crate) stats: Arc<StatisticsCollector>,
}

impl Entry {
    /// Validates `registration` and builds the entry.
    ///
    /// # Errors
    /// - [`InjectaError::InvalidKey`], [`InjectaError::InvalidKeyType`],
    ///   [`InjectaError::InvalidRegistrationShape`]: bad target
    /// - [`InjectaError::InvalidResolver`]: nothing to resolve, or a
    ///   callable given as an instance
    /// - [`InjectaError::InvalidLifecycleCombination`]: factory instance,
    ///   scoped singleton, scoped instance, instance with arguments
    /// - [`InjectaError::NotCallable`]: a plain value given to a lifecycle
    ///   that invokes its resolver
    pub(crate) fn from_registration(
        registration: Registration,
        normalizer: &dyn KeyNormalizer,
        stats: Arc<StatisticsCollector>,
    ) -> Result<Self> {
        let Registration {
            target,
            lifecycle,
            scoped,
            resolvable,
            static_args,
        } = registration;

        let parsed = target.parse(normalizer)?;
        let key = parsed.key;

        let Some(resolvable) = resolvable else {
            return Err(InjectaError::InvalidResolver {
                key,
                reason: "the resolver is missing",
            });
        };

        let is_factory = matches!(resolvable, Resolvable::Factory { .. });
        let scoped = scoped || lifecycle == Lifecycle::ScopedTransient;

        let combination = |reason| InjectaError::InvalidLifecycleCombination {
            key: key.clone(),
            reason,
        };
        match lifecycle {
            Lifecycle::Instance if is_factory => {
                return Err(combination("the factory should be transient or singleton"));
            }
            Lifecycle::Instance if scoped => {
                return Err(combination("an instance cannot be scoped"));
            }
            Lifecycle::Instance if !static_args.is_empty() => {
                return Err(combination("an instance takes no arguments"));
            }
            Lifecycle::Singleton if scoped => {
                return Err(combination("a singleton cannot be scoped"));
            }
            _ => {}
        }

        let lifecycle = match lifecycle {
            Lifecycle::Transient if scoped => Lifecycle::ScopedTransient,
            other => other,
        };

        let (source, bound_context) = match (lifecycle, resolvable) {
            (Lifecycle::Instance, Resolvable::Value(value)) => (Source::Value(value), None),
            (Lifecycle::Instance, _) => {
                return Err(InjectaError::InvalidResolver {
                    key,
                    reason: "an instance registration takes a value, not a constructor",
                });
            }
            (other, Resolvable::Value(_)) => {
                return Err(InjectaError::NotCallable {
                    key,
                    lifecycle: other.label(),
                });
            }
            (_, Resolvable::Constructor(create)) => (Source::Create(create), None),
            (_, Resolvable::Factory { create, context }) => (Source::Create(create), context),
        };

        Ok(Entry {
            scope_key: key.clone(),
            key,
            tags: parsed.tags,
            lifecycle,
            is_factory,
            static_args,
            bound_context,
            source,
            singleton: (lifecycle == Lifecycle::Singleton).then(SingletonCache::default),
            stats,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Tags in registration order; empty for untagged entries.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_factory(&self) -> bool {
        self.is_factory
    }

    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    /// `true` if any of `tags` is one of this entry's tags.
    pub fn matches_any(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }

    pub(crate) fn labels(&self) -> Vec<&'static str> {
        registration_labels(self.lifecycle, self.is_factory, self.is_tagged())
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("tags", &self.tags)
            .field("lifecycle", &self.lifecycle)
            .field("is_factory", &self.is_factory)
            .field("static_args", &self.static_args)
            .field("singleton_created", &self.singleton.as_ref().map(SingletonCache::is_created))
            .finish()
    }
}

/// What a canonical key maps to.
#[derive(Debug, Clone)]
pub enum Slot {
    /// The only registration under the key.
    Single(Arc<Entry>),
    /// Several registrations (or a tagged one), in registration order.
    Group(Vec<Arc<Entry>>),
}

/// Stores all registrations, keeping key registration order.
#[derive(Debug, Default)]
pub struct Registry {
    order: Vec<String>,
    slots: HashMap<String, Slot>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    ///
    /// A tagged entry always lives in a group; an untagged entry under an
    /// existing key is rejected. An untagged entry followed by tagged ones
    /// stays first in the group.
    ///
    /// # Errors
    /// Returns [`InjectaError::AlreadyRegistered`] if `entry` is untagged
    /// and its key is taken.
    pub(crate) fn insert(&mut self, mut entry: Entry) -> Result<()> {
        let key = entry.key.clone();
        let tagged = entry.is_tagged();

        match self.slots.get_mut(&key) {
            None => {
                let slot = if tagged {
                    entry.scope_key = format!("{key}#0");
                    Slot::Group(vec![Arc::new(entry)])
                } else {
                    Slot::Single(Arc::new(entry))
                };
                self.order.push(key.clone());
                self.slots.insert(key, slot);
            }
            Some(_) if !tagged => {
                warn!(key = %key, "Rejected untagged registration of a taken key");
                return Err(InjectaError::AlreadyRegistered(AlreadyRegisteredError { key }));
            }
            Some(slot) => match slot {
                Slot::Single(first) => {
                    let first = first.clone();
                    entry.scope_key = format!("{key}#1");
                    debug!(key = %key, "Key converted to a tagged group");
                    *slot = Slot::Group(vec![first, Arc::new(entry)]);
                }
                Slot::Group(entries) => {
                    entry.scope_key = format!("{key}#{}", entries.len());
                    entries.push(Arc::new(entry));
                }
            },
        }
        Ok(())
    }

    /// Looks up the slot of a canonical key.
    pub fn get(&self, key: &str) -> Option<&Slot> {
        self.slots.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Keys with their slots, in the order keys were first registered.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Slot>)> {
        self.order.iter().map(|k| (k.as_str(), self.slots.get(k)))
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Returns the number of registered keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::DefaultNormalizer;

    fn stats() -> Arc<StatisticsCollector> {
        Arc::new(StatisticsCollector::new())
    }

    fn constructor() -> Resolvable {
        Resolvable::Constructor(Arc::new(|_| Ok(Arc::new(42i32) as Value)))
    }

    fn entry(registration: Registration) -> Result<Entry> {
        Entry::from_registration(registration, &DefaultNormalizer, stats())
    }

    #[test]
    fn transient_scoped_becomes_scoped_transient() {
        let e = entry(Registration::new("Scoped", Lifecycle::Transient, constructor()).scoped(true)).unwrap();
        assert_eq!(e.key(), "scoped");
        assert_eq!(e.lifecycle(), Lifecycle::ScopedTransient);
        assert!(e.singleton.is_none());
    }

    #[test]
    fn singleton_gets_a_cache() {
        let e = entry(Registration::new("component", Lifecycle::Singleton, constructor())).unwrap();
        assert!(e.singleton.is_some());
    }

    #[test]
    fn singleton_scoped_rejected() {
        let err = entry(Registration::new("component", Lifecycle::Singleton, constructor()).scoped(true)).unwrap_err();
        assert!(matches!(err, InjectaError::InvalidLifecycleCombination { .. }));
    }

    #[test]
    fn factory_instance_rejected() {
        let factory = Resolvable::factory_value(|_| Ok(Arc::new(1u8) as Value), None);
        let err = entry(Registration::new("sample", Lifecycle::Instance, factory)).unwrap_err();
        assert!(matches!(err, InjectaError::InvalidLifecycleCombination { .. }));
    }

    #[test]
    fn missing_resolver_rejected() {
        let mut registration = Registration::new("sample", Lifecycle::Transient, constructor());
        registration.resolvable = None;
        let err = entry(registration).unwrap_err();
        assert!(matches!(err, InjectaError::InvalidResolver { .. }));
    }

    #[test]
    fn value_for_transient_not_callable() {
        let err = entry(Registration::new(
            "sample",
            Lifecycle::Transient,
            Resolvable::Value(Arc::new(1u8)),
        ))
        .unwrap_err();
        assert!(matches!(err, InjectaError::NotCallable { .. }));
    }

    #[test]
    fn constructor_for_instance_rejected() {
        let err = entry(Registration::new("sample", Lifecycle::Instance, constructor())).unwrap_err();
        assert!(matches!(err, InjectaError::InvalidResolver { .. }));
    }

    #[test]
    fn singleton_cache_creates_once() {
        let cache = SingletonCache::default();
        let (first, created) = cache.get_or_create("component", || Ok(Arc::new(1i32) as Value)).unwrap();
        assert!(created);
        let (second, created) = cache.get_or_create("component", || Ok(Arc::new(2i32) as Value)).unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn singleton_cache_stays_empty_on_error() {
        let cache = SingletonCache::default();
        let result = cache.get_or_create("component", || Err(InjectaError::construction("component", "boom")));
        assert!(result.is_err());
        assert!(!cache.is_created());
    }

    #[test]
    fn duplicate_untagged_fails() {
        let mut reg = Registry::new();
        reg.insert(entry(Registration::new("sample", Lifecycle::Transient, constructor())).unwrap())
            .unwrap();
        let err = reg
            .insert(entry(Registration::new("sample", Lifecycle::Transient, constructor())).unwrap())
            .unwrap_err();
        assert!(matches!(err, InjectaError::AlreadyRegistered(_)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn tagged_registration_converts_to_group_once() {
        let mut reg = Registry::new();
        reg.insert(entry(Registration::new("handler", Lifecycle::Transient, constructor())).unwrap())
            .unwrap();
        assert!(matches!(reg.get("handler"), Some(Slot::Single(_))));

        for tag in ["one", "two"] {
            let target = RegistrationTarget::tagged("handler", [tag]);
            reg.insert(entry(Registration::new(target, Lifecycle::Transient, constructor())).unwrap())
                .unwrap();
        }

        match reg.get("handler") {
            Some(Slot::Group(entries)) => {
                assert_eq!(entries.len(), 3);
                assert!(entries[0].tags().is_empty());
                assert_eq!(entries[2].tags(), ["two".to_string()]);
            }
            other => panic!("expected a group, got {other:?}"),
        }
        assert_eq!(reg.keys().collect::<Vec<_>>(), vec!["handler"]);
    }

    #[test]
    fn grouped_entries_get_distinct_scope_slots() {
        let mut reg = Registry::new();
        reg.insert(entry(Registration::new("handler", Lifecycle::Transient, constructor())).unwrap())
            .unwrap();
        for tag in ["one", "two"] {
            let target = RegistrationTarget::tagged("handler", [tag]);
            reg.insert(entry(Registration::new(target, Lifecycle::Transient, constructor()).scoped(true)).unwrap())
                .unwrap();
        }
        let target = RegistrationTarget::tagged("worker", ["solo"]);
        reg.insert(entry(Registration::new(target, Lifecycle::Transient, constructor())).unwrap())
            .unwrap();

        let Some(Slot::Group(entries)) = reg.get("handler") else {
            panic!("expected a group");
        };
        let slots: Vec<&str> = entries.iter().map(|e| e.scope_key.as_str()).collect();
        assert_eq!(slots, vec!["handler", "handler#1", "handler#2"]);

        let Some(Slot::Group(entries)) = reg.get("worker") else {
            panic!("expected a group");
        };
        assert_eq!(entries[0].scope_key, "worker#0");
    }

    #[test]
    fn singleton_cache_rejects_its_own_creator() {
        let cache = SingletonCache::default();
        let err = cache
            .get_or_create("component", || {
                cache
                    .get_or_create("component", || Ok(Arc::new(1i32) as Value))
                    .map(|(value, _)| value)
            })
            .unwrap_err();

        assert!(matches!(err, InjectaError::SingletonReentered { .. }));
        assert!(!cache.is_created());

        let (_, created) = cache.get_or_create("component", || Ok(Arc::new(2i32) as Value)).unwrap();
        assert!(created);
    }

    #[test]
    fn keys_keep_registration_order() {
        let mut reg = Registry::new();
        for key in ["zeta", "alpha", "mid"] {
            reg.insert(entry(Registration::new(key, Lifecycle::Transient, constructor())).unwrap())
                .unwrap();
        }
        assert_eq!(reg.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }
}
