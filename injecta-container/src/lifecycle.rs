//! Instance creation per lifecycle.
//!
//! Given an entry, an owner and call-time arguments, decide whether to
//! create, cache or reuse. Static registration arguments always come first,
//! call-time arguments are appended.

use std::any::type_name;
use std::sync::Arc;

use tracing::trace;

use crate::args::{Args, Value};
use crate::binder::Owner;
use crate::error::Result;
use crate::registry::{Entry, Source};
use crate::scope::Lifecycle;

/// Everything a constructor or factory receives.
///
/// The owner comes first so creators can pull sibling resolvers already
/// bound onto it; that is how one registration depends on another.
pub struct Invocation<'a> {
    key: &'a str,
    owner: &'a Owner,
    args: &'a Args,
    context: Option<&'a Value>,
}

impl<'a> Invocation<'a> {
    /// Canonical key being resolved.
    pub fn key(&self) -> &'a str {
        self.key
    }

    pub fn owner(&self) -> &'a Owner {
        self.owner
    }

    /// Static arguments followed by call-time arguments.
    pub fn args(&self) -> &'a Args {
        self.args
    }

    /// Typed positional argument.
    pub fn arg<T: 'static>(&self, index: usize) -> Option<&'a T> {
        self.args.get(index)
    }

    /// The bound context of a factory, if it has one of type `C`.
    ///
    /// Always `None` for constructors.
    pub fn context<C: 'static>(&self) -> Option<&'a C> {
        self.context.and_then(|c| c.downcast_ref::<C>())
    }
}

/// A type the container can allocate.
///
/// The default resolver key of an implementor is its bare type name,
/// normalized (`UserService` → `userService`).
///
/// # Examples
/// ```
/// use injecta_container::lifecycle::{Construct, Invocation};
/// use injecta_container::error::Result;
///
/// struct Greeting(String);
///
/// impl Construct for Greeting {
///     fn construct(inv: &Invocation<'_>) -> Result<Self> {
///         let name = inv.arg::<&'static str>(0).copied().unwrap_or("world");
///         Ok(Greeting(format!("hello, {name}")))
///     }
/// }
/// ```
pub trait Construct: Sized + Send + Sync + 'static {
    fn construct(inv: &Invocation<'_>) -> Result<Self>;
}

/// Resolves `entry` for `owner` with call-time `dynamic` arguments.
pub(crate) fn resolve(entry: &Entry, owner: &Owner, dynamic: &Args) -> Result<Value> {
    trace!(key = %entry.key, lifecycle = %entry.lifecycle, args = dynamic.len(), "Resolving");

    let create = match &entry.source {
        Source::Value(value) => return Ok(value.clone()),
        Source::Create(create) => create,
    };

    let invoke = || -> Result<Value> {
        let combined = entry.static_args.concat(dynamic);
        let inv = Invocation {
            key: &entry.key,
            owner,
            args: &combined,
            context: if entry.is_factory {
                entry.bound_context.as_ref()
            } else {
                None
            },
        };
        create(&inv)
    };

    match (entry.lifecycle, &entry.singleton) {
        (Lifecycle::Singleton, Some(cache)) => {
            let (value, created) = cache.get_or_create(&entry.key, invoke)?;
            if created {
                entry.stats.record_creation(&entry.key);
            } else {
                if !dynamic.is_empty() {
                    trace!(key = %entry.key, "Singleton already created, call arguments ignored");
                }
                entry.stats.record_singleton_reuse(&entry.key);
            }
            Ok(value)
        }
        (Lifecycle::ScopedTransient, _) => {
            if let Some(value) = owner.scope().get(&entry.scope_key) {
                entry.stats.record_scoped_hit(&entry.key);
                return Ok(value);
            }
            let value = invoke()?;
            let stored = owner.scope().get_or_store(&entry.scope_key, value.clone());
            // A nested resolution may have filled the slot first; ours is dropped.
            if Arc::ptr_eq(&stored, &value) {
                entry.stats.record_creation(&entry.key);
            } else {
                entry.stats.record_scoped_hit(&entry.key);
            }
            Ok(stored)
        }
        _ => {
            let value = invoke()?;
            entry.stats.record_creation(&entry.key);
            Ok(value)
        }
    }
}

/// Creator allocating `T` through its [`Construct`] impl.
pub(crate) fn constructor_of<T: Construct>() -> crate::registry::CreateFn {
    Arc::new(|inv: &Invocation<'_>| {
        trace!(type_name = type_name::<T>(), "Constructing");
        Ok(Arc::new(T::construct(inv)?) as Value)
    })
}

/// Creator wrapping a typed factory closure.
pub(crate) fn factory_of<T, F>(factory: F) -> crate::registry::CreateFn
where
    T: Send + Sync + 'static,
    F: Fn(&Invocation<'_>) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |inv: &Invocation<'_>| Ok(Arc::new(factory(inv)?) as Value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::DefaultNormalizer;
    use crate::registry::{Registration, Resolvable};
    use crate::stats::StatisticsCollector;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter(u32);

    fn entry_with(
        lifecycle: Lifecycle,
        scoped: bool,
        static_args: Args,
        stats: &Arc<StatisticsCollector>,
    ) -> (Entry, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let resolvable = Resolvable::Factory {
            create: factory_of(move |_| Ok(Counter(counter.fetch_add(1, Ordering::SeqCst)))),
            context: None,
        };
        let registration = Registration::new("counter", lifecycle, resolvable)
            .scoped(scoped)
            .static_args(static_args);
        let entry = Entry::from_registration(registration, &DefaultNormalizer, stats.clone()).unwrap();
        (entry, calls)
    }

    #[test]
    fn transient_creates_every_call() {
        let stats = Arc::new(StatisticsCollector::new());
        let (entry, calls) = entry_with(Lifecycle::Transient, false, Args::new(), &stats);
        let owner = Owner::new();

        let a = resolve(&entry, &owner, &Args::new()).unwrap();
        let b = resolve(&entry, &owner, &Args::new()).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.created("counter"), 2);
    }

    #[test]
    fn singleton_creates_once_across_owners() {
        let stats = Arc::new(StatisticsCollector::new());
        let (entry, calls) = entry_with(Lifecycle::Singleton, false, Args::new(), &stats);

        let a = resolve(&entry, &Owner::new(), &Args::new()).unwrap();
        let b = resolve(&entry, &Owner::new(), &Args::new().with(5i32)).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snap = stats.snapshot();
        assert_eq!(snap.created.total, 1);
        assert_eq!(snap.singleton_reuses.by_key["counter"], 1);
    }

    #[test]
    fn scoped_caches_per_owner() {
        let stats = Arc::new(StatisticsCollector::new());
        let (entry, calls) = entry_with(Lifecycle::Transient, true, Args::new(), &stats);
        let first = Owner::new();
        let second = Owner::new();

        let a1 = resolve(&entry, &first, &Args::new()).unwrap();
        let a2 = resolve(&entry, &first, &Args::new()).unwrap();
        let b1 = resolve(&entry, &second, &Args::new()).unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(stats.snapshot().scoped_hits.total, 1);
    }

    #[test]
    fn static_args_precede_dynamic_args() {
        let stats = Arc::new(StatisticsCollector::new());
        let resolvable = Resolvable::Factory {
            create: factory_of(|inv| {
                Ok((
                    *inv.arg::<i32>(0).unwrap(),
                    *inv.arg::<i32>(1).unwrap(),
                    inv.arg::<String>(2).cloned().unwrap(),
                ))
            }),
            context: None,
        };
        let registration = Registration::new("tuple", Lifecycle::Transient, resolvable)
            .static_args(Args::new().with(0i32).with(1i32));
        let entry = Entry::from_registration(registration, &DefaultNormalizer, stats).unwrap();

        let value = resolve(&entry, &Owner::new(), &Args::new().with(String::from("x"))).unwrap();
        let tuple = value.downcast::<(i32, i32, String)>().unwrap();
        assert_eq!(*tuple, (0, 1, "x".to_string()));
    }

    #[test]
    fn factory_sees_bound_context() {
        struct Parent {
            name: &'static str,
        }

        let stats = Arc::new(StatisticsCollector::new());
        let resolvable = Resolvable::Factory {
            create: factory_of(|inv| Ok(inv.context::<Parent>().map(|p| p.name))),
            context: Some(Arc::new(Parent { name: "parent object" })),
        };
        let registration = Registration::new("named", Lifecycle::Transient, resolvable);
        let entry = Entry::from_registration(registration, &DefaultNormalizer, stats).unwrap();

        let value = resolve(&entry, &Owner::new(), &Args::new()).unwrap();
        let name = value.downcast::<Option<&'static str>>().unwrap();
        assert_eq!(*name, Some("parent object"));
    }

    #[test]
    fn failed_creation_is_not_counted() {
        let stats = Arc::new(StatisticsCollector::new());
        let resolvable = Resolvable::factory_value(
            |inv| Err(crate::error::InjectaError::construction(inv.key(), "offline")),
            None,
        );
        let registration = Registration::new("broken", Lifecycle::Transient, resolvable);
        let entry = Entry::from_registration(registration, &DefaultNormalizer, stats.clone()).unwrap();

        assert!(resolve(&entry, &Owner::new(), &Args::new()).is_err());
        assert_eq!(stats.created("broken"), 0);
    }
}
