//! # The Container and its injection entry point
//!
//! A [`Container`] collects registrations during setup; [`Injection`]
//! freezes it and binds resolvers onto per-request owners.
//!
//! # Architecture
//! ```text
//! Injection::setup(callback, Options)
//!        │  callback(&mut Container), then modules in order
//!        ▼
//!    Injection ──injector()──> Injector ──inject(owner, next)──> next(owner)
//!        │
//!        └── get_resolver(name) / resolve(name, args)   (throwaway owner)
//! ```
//!
//! # Examples
//! ```rust
//! use injecta_container::prelude::*;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: std::sync::Arc<Database>,
//! }
//!
//! impl Construct for UserService {
//!     fn construct(inv: &Invocation<'_>) -> Result<Self> {
//!         let db = inv.owner().resolve::<Database>("database", Args::new())?;
//!         Ok(UserService { db })
//!     }
//! }
//!
//! let injection = Injection::setup(
//!     |c| {
//!         c.register_singleton_factory(
//!             "Database",
//!             |_| Ok(Database { url: "postgres://localhost".into() }),
//!             None,
//!             Args::new(),
//!         )?
//!         .register_transient::<UserService>(false, Args::new())?;
//!         Ok(())
//!     },
//!     Options::new(),
//! )
//! .expect("setup failed");
//!
//! let mut owner = Owner::new();
//! injection.bind(&mut owner, false).expect("bind failed");
//! let service = owner.resolve::<UserService>("userService", Args::new()).unwrap();
//! assert_eq!(service.db.url, "postgres://localhost");
//! ```

use std::fmt;
use std::sync::Arc;

use injecta_support::rendering::suggest_similar;
use tracing::{debug, info, instrument, warn};

use crate::args::{Args, Value, downcast};
use crate::binder::{self, DetachedResolver, Owner};
use crate::error::{InjectaError, NotFoundError, Result};
use crate::key::{DefaultNormalizer, KeyNormalizer, RegistrationTarget, canonical_key};
use crate::lifecycle::{Construct, Invocation, constructor_of, factory_of};
use crate::module::{self, Module, ModuleOptions};
use crate::registry::{Entry, Registration, Registry, Resolvable};
use crate::scope::Lifecycle;
use crate::stats::{StatisticsCollector, StatisticsSnapshot};

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Registration surface handed to setup callbacks and modules.
///
/// Every `register_*` method validates the registration, appends it to the
/// registry and updates the registration counters. A failed call leaves
/// the registry untouched.
pub struct Container {
    registry: Registry,
    normalizer: Arc<dyn KeyNormalizer>,
    stats: Arc<StatisticsCollector>,
}

impl Container {
    /// Container with the default key normalizer.
    pub fn new() -> Self {
        Self::with_shared_normalizer(Arc::new(DefaultNormalizer))
    }

    /// Container with a custom key normalizer.
    pub fn with_normalizer(normalizer: impl KeyNormalizer + 'static) -> Self {
        Self::with_shared_normalizer(Arc::new(normalizer))
    }

    fn with_shared_normalizer(normalizer: Arc<dyn KeyNormalizer>) -> Self {
        Self {
            registry: Registry::new(),
            normalizer,
            stats: Arc::new(StatisticsCollector::new()),
        }
    }

    /// Canonical form of `raw` under this container's normalizer.
    pub fn normalize(&self, raw: &str) -> Result<String> {
        canonical_key(self.normalizer.as_ref(), raw)
    }

    /// Validates and stores a raw registration.
    ///
    /// # Errors
    /// Any registration-time error: [`InjectaError::InvalidKey`],
    /// [`InjectaError::InvalidKeyType`], [`InjectaError::InvalidRegistrationShape`],
    /// [`InjectaError::InvalidResolver`], [`InjectaError::NotCallable`],
    /// [`InjectaError::InvalidLifecycleCombination`],
    /// [`InjectaError::AlreadyRegistered`].
    pub fn register(&mut self, registration: Registration) -> Result<&mut Self> {
        let entry = Entry::from_registration(registration, self.normalizer.as_ref(), self.stats.clone())
            .inspect_err(|e| warn!(error = %e, "Registration rejected"))?;

        let key = entry.key.clone();
        let labels = entry.labels();
        debug!(
            key = %key,
            lifecycle = %entry.lifecycle,
            factory = entry.is_factory,
            tags = ?entry.tags,
            "Registering"
        );

        self.registry.insert(entry)?;
        self.stats.record_registration(&key, &labels);
        Ok(self)
    }

    // ── Instance ──

    /// Registers a pre-built value, returned as-is on every resolution.
    pub fn register_instance<T: Send + Sync + 'static>(
        &mut self,
        target: impl Into<RegistrationTarget>,
        value: T,
    ) -> Result<&mut Self> {
        self.register_shared(target, Arc::new(value))
    }

    /// Registers an already shared value; resolutions return this very `Arc`.
    pub fn register_shared<T: Send + Sync + 'static>(
        &mut self,
        target: impl Into<RegistrationTarget>,
        value: Arc<T>,
    ) -> Result<&mut Self> {
        self.register(Registration::new(target, Lifecycle::Instance, Resolvable::Value(value)))
    }

    // ── Constructors ──

    /// Registers `T` under its type-derived key, created on every resolution
    /// (or once per owner if `scoped`).
    pub fn register_transient<T: Construct>(&mut self, scoped: bool, args: Args) -> Result<&mut Self> {
        self.register_transient_named::<T>(RegistrationTarget::of::<T>(), scoped, args)
    }

    /// [`register_transient`](Self::register_transient) under an explicit
    /// (possibly tagged) target.
    pub fn register_transient_named<T: Construct>(
        &mut self,
        target: impl Into<RegistrationTarget>,
        scoped: bool,
        args: Args,
    ) -> Result<&mut Self> {
        self.register(
            Registration::new(target, Lifecycle::Transient, Resolvable::Constructor(constructor_of::<T>()))
                .scoped(scoped)
                .static_args(args),
        )
    }

    /// Shorthand for `register_transient::<T>(true, args)`.
    pub fn register_transient_scoped<T: Construct>(&mut self, args: Args) -> Result<&mut Self> {
        self.register_transient::<T>(true, args)
    }

    /// Registers `T` under its type-derived key, created once per container.
    ///
    /// The constructor must not resolve this same singleton: such a
    /// resolution fails with [`InjectaError::SingletonReentered`].
    pub fn register_singleton<T: Construct>(&mut self, args: Args) -> Result<&mut Self> {
        self.register_singleton_named::<T>(RegistrationTarget::of::<T>(), args)
    }

    /// [`register_singleton`](Self::register_singleton) under an explicit key.
    pub fn register_singleton_named<T: Construct>(
        &mut self,
        target: impl Into<RegistrationTarget>,
        args: Args,
    ) -> Result<&mut Self> {
        self.register(
            Registration::new(target, Lifecycle::Singleton, Resolvable::Constructor(constructor_of::<T>()))
                .static_args(args),
        )
    }

    // ── Factories ──

    /// Registers a factory invoked on every resolution (or once per owner if
    /// `scoped`). `context` is what the factory sees through
    /// [`Invocation::context`].
    pub fn register_transient_factory<T, F>(
        &mut self,
        target: impl Into<RegistrationTarget>,
        factory: F,
        scoped: bool,
        context: Option<Value>,
        args: Args,
    ) -> Result<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&Invocation<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let create = factory_of(factory);
        self.register(
            Registration::new(target, Lifecycle::Transient, Resolvable::Factory { create, context })
                .scoped(scoped)
                .static_args(args),
        )
    }

    /// Shorthand for a scoped [`register_transient_factory`](Self::register_transient_factory).
    pub fn register_transient_scoped_factory<T, F>(
        &mut self,
        target: impl Into<RegistrationTarget>,
        factory: F,
        context: Option<Value>,
        args: Args,
    ) -> Result<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&Invocation<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.register_transient_factory(target, factory, true, context, args)
    }

    /// Registers a factory invoked once per container.
    ///
    /// Resolving the factory's own key from inside it fails with
    /// [`InjectaError::SingletonReentered`] rather than blocking.
    pub fn register_singleton_factory<T, F>(
        &mut self,
        target: impl Into<RegistrationTarget>,
        factory: F,
        context: Option<Value>,
        args: Args,
    ) -> Result<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(&Invocation<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let create = factory_of(factory);
        self.register(
            Registration::new(target, Lifecycle::Singleton, Resolvable::Factory { create, context })
                .static_args(args),
        )
    }

    // ── Access ──

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn statistics(&self) -> &StatisticsCollector {
        &self.stats
    }

    /// Binds one resolver per registered key onto `owner`.
    ///
    /// See [`binder::bind`].
    pub fn bind(&self, owner: &mut Owner, force: bool) -> Result<()> {
        binder::bind(owner, &self.registry, force)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.registry.len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Options
// ═══════════════════════════════════════════

/// Setup options for [`Injection::setup`].
#[derive(Default)]
pub struct Options {
    normalizer: Option<Arc<dyn KeyNormalizer>>,
    modules: Vec<Box<dyn Module>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the default key normalizer.
    ///
    /// ```rust
    /// use injecta_container::prelude::*;
    ///
    /// let options = Options::new().key_name_normalization(|raw: &str| raw.to_lowercase());
    /// # let _ = options;
    /// ```
    pub fn key_name_normalization(mut self, normalizer: impl KeyNormalizer + 'static) -> Self {
        self.normalizer = Some(Arc::new(normalizer));
        self
    }

    /// Appends a module, applied after the main setup callback.
    pub fn module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("custom_normalizer", &self.normalizer.is_some())
            .field("modules", &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Injection
// ═══════════════════════════════════════════

/// A configured container, read-only after setup.
#[derive(Clone)]
pub struct Injection {
    container: Arc<Container>,
    module_options: Arc<ModuleOptions>,
}

impl Injection {
    /// Builds a container: runs `setup`, then every module of `options`.
    ///
    /// # Errors
    /// Errors of the setup callback are returned as-is; a failing module
    /// yields [`InjectaError::Setup`].
    #[instrument(skip_all, name = "injection_setup")]
    pub fn setup<F>(configure: F, options: Options) -> Result<Self>
    where
        F: FnOnce(&mut Container) -> Result<()>,
    {
        let Options { normalizer, modules } = options;
        let mut container = match normalizer {
            Some(normalizer) => Container::with_shared_normalizer(normalizer),
            None => Container::new(),
        };

        configure(&mut container)?;
        let module_options = module::apply_modules(&mut container, &modules)?;

        info!(
            registered = container.registry.len(),
            modules = modules.len(),
            module_options = module_options.len(),
            "Container ready"
        );
        Ok(Self {
            container: Arc::new(container),
            module_options: Arc::new(module_options),
        })
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Options contributed by the setup modules, merged in module order.
    pub fn module_options(&self) -> &ModuleOptions {
        &self.module_options
    }

    /// Request middleware around this injection.
    pub fn injector(&self) -> Injector {
        Injector {
            container: self.container.clone(),
        }
    }

    /// Binds resolvers onto `owner`.
    pub fn bind(&self, owner: &mut Owner, force: bool) -> Result<()> {
        self.container.bind(owner, force)
    }

    /// Resolver for `name` bound to a fresh throwaway owner, or `None` if
    /// nothing is registered under the normalized name.
    pub fn get_resolver(&self, name: &str) -> Option<DetachedResolver> {
        let key = self.container.normalize(name).ok()?;
        if !self.container.registry.contains(&key) {
            return None;
        }
        let mut owner = Owner::new();
        self.container.bind(&mut owner, false).ok()?;
        Some(DetachedResolver::new(owner, key))
    }

    /// Resolves `name` on a throwaway owner.
    ///
    /// # Errors
    /// [`InjectaError::ResolverNotFound`] if nothing is registered under the
    /// normalized name, otherwise whatever resolution fails with.
    pub fn resolve(&self, name: &str, args: Args) -> Result<Value> {
        match self.get_resolver(name) {
            Some(resolver) => resolver.call(args),
            None => {
                let key = self.container.normalize(name).unwrap_or_else(|_| name.to_string());
                let keys: Vec<&str> = self.container.registry.keys().collect();
                warn!(key = %key, "No resolver registered");
                Err(InjectaError::ResolverNotFound(NotFoundError {
                    suggestions: suggest_similar(&key, &keys, 3),
                    key,
                }))
            }
        }
    }

    /// [`resolve`](Self::resolve), downcast to `T`.
    pub fn resolve_as<T: Send + Sync + 'static>(&self, name: &str, args: Args) -> Result<Arc<T>> {
        let value = self.resolve(name, args)?;
        let key = self.container.normalize(name).unwrap_or_else(|_| name.to_string());
        downcast(&key, value)
    }

    /// Point-in-time copy of the counters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.container.stats.snapshot()
    }

    /// Clears creation and cache counters; registration counters survive.
    pub fn reset_statistics(&self) {
        self.container.stats.reset();
    }
}

impl fmt::Debug for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injection")
            .field("container", &self.container)
            .field("module_options", &self.module_options)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Injector (middleware)
// ═══════════════════════════════════════════

/// Per-request middleware: binds, then calls the continuation.
///
/// ```rust,ignore
/// let injector = injection.injector();
/// let body = injector.inject_request(request, |owner| handle(owner))?;
/// ```
#[derive(Clone)]
pub struct Injector {
    container: Arc<Container>,
}

impl Injector {
    /// Binds resolvers onto `owner` and runs `next` with it.
    pub fn inject<R>(&self, owner: &mut Owner, next: impl FnOnce(&mut Owner) -> R) -> Result<R> {
        self.container.bind(owner, false)?;
        Ok(next(owner))
    }

    /// Builds an owner carrying `request` under `req`, binds it and runs
    /// `next`.
    ///
    /// # Errors
    /// [`InjectaError::PropertyCollision`] if something is registered
    /// under `req`.
    pub fn inject_request<Req, R>(&self, request: Req, next: impl FnOnce(&Owner) -> R) -> Result<R>
    where
        Req: Send + Sync + 'static,
    {
        let mut owner = Owner::for_request(request);
        self.container.bind(&mut owner, false)?;
        Ok(next(&owner))
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector").finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, Injection, Injector, Options};
    pub use crate::args::{Args, Value, value};
    pub use crate::binder::{DetachedResolver, Owner, Resolver, ResolverGroup, TagFilter};
    pub use crate::error::{InjectaError, Result};
    pub use crate::key::{KeyNormalizer, RegistrationTarget};
    pub use crate::lifecycle::{Construct, Invocation};
    pub use crate::module::{Module, ModuleOptions};
    pub use crate::registry::{Registration, Resolvable};
    pub use crate::scope::Lifecycle;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample {
        args: usize,
    }

    impl Construct for Sample {
        fn construct(inv: &Invocation<'_>) -> Result<Self> {
            Ok(Sample {
                args: inv.args().len(),
            })
        }
    }

    #[test]
    fn register_records_statistics() {
        let mut container = Container::new();
        container
            .register_instance("config", 1u8)
            .unwrap()
            .register_transient_scoped::<Sample>(Args::new())
            .unwrap();

        let snap = container.statistics().snapshot();
        assert_eq!(snap.registered.total, 2);
        assert_eq!(snap.registered.labels["sample"], vec!["transient", "scoped"]);
        assert_eq!(snap.registered.by_kind["instance"], 1);
    }

    #[test]
    fn rejected_registration_leaves_registry_untouched() {
        let mut container = Container::new();
        let registration = Registration::new(
            "component",
            Lifecycle::Singleton,
            Resolvable::Constructor(constructor_of::<Sample>()),
        )
        .scoped(true);
        let err = container.register(registration).unwrap_err();

        assert!(matches!(err, InjectaError::InvalidLifecycleCombination { .. }));
        assert!(container.registry().is_empty());
        assert_eq!(container.statistics().snapshot().registered.total, 0);
    }

    #[test]
    fn custom_normalizer_applies_to_keys() {
        let injection = Injection::setup(
            |c| {
                c.register_instance("Sample", 1u8)?;
                Ok(())
            },
            Options::new().key_name_normalization(|raw: &str| raw.to_uppercase()),
        )
        .unwrap();

        let mut owner = Owner::new();
        injection.bind(&mut owner, false).unwrap();
        assert!(owner.has_property("SAMPLE"));
        assert!(injection.get_resolver("sample").is_some());
    }

    #[test]
    fn get_resolver_normalizes_name() {
        let injection = Injection::setup(
            |c| {
                c.register_transient::<Sample>(false, Args::new().with(1u8))?;
                Ok(())
            },
            Options::new(),
        )
        .unwrap();

        let resolver = injection.get_resolver("Sample").unwrap();
        assert_eq!(resolver.key(), "sample");
        let sample = resolver.get::<Sample>(Args::new().with(2u8)).unwrap();
        assert_eq!(sample.args, 2);
        assert!(injection.get_resolver("missing").is_none());
    }

    #[test]
    fn detached_resolver_reaches_tagged_group() {
        let injection = Injection::setup(
            |c| {
                c.register_instance(RegistrationTarget::tagged("handler", ["get"]), "list")?
                    .register_instance(RegistrationTarget::tagged("handler", ["post"]), "create")?;
                Ok(())
            },
            Options::new(),
        )
        .unwrap();

        let resolver = injection.get_resolver("Handler").unwrap();
        assert!(matches!(
            resolver.call(Args::new()).unwrap_err(),
            InjectaError::BindingKindMismatch { .. }
        ));
        let group = resolver.group().unwrap();
        let post = group.resolvers("post").unwrap();
        assert_eq!(post.len(), 1);
        assert_eq!(*post[0].get::<&'static str>(Args::new()).unwrap(), "create");
    }

    #[test]
    fn resolve_unknown_name_suggests() {
        let injection = Injection::setup(
            |c| {
                c.register_instance("userService", 1u8)?;
                Ok(())
            },
            Options::new(),
        )
        .unwrap();

        match injection.resolve("userServic", Args::new()).unwrap_err() {
            InjectaError::ResolverNotFound(e) => {
                assert_eq!(e.key, "userServic");
                assert_eq!(e.suggestions, vec!["userService".to_string()]);
            }
            other => panic!("expected ResolverNotFound, got {other:?}"),
        }
    }

    #[test]
    fn setup_error_is_returned() {
        let err = Injection::setup(
            |c| {
                c.register_instance("sample", 1u8)?;
                c.register_instance("Sample", 2u8)?;
                Ok(())
            },
            Options::new(),
        )
        .unwrap_err();
        assert!(matches!(err, InjectaError::AlreadyRegistered(_)));
    }

    #[test]
    fn injector_binds_then_continues() {
        let injection = Injection::setup(
            |c| {
                c.register_instance("greeting", "hello")?;
                Ok(())
            },
            Options::new(),
        )
        .unwrap();

        let body = injection
            .injector()
            .inject_request(String::from("GET /"), |owner| {
                let greeting = owner.resolve::<&'static str>("greeting", Args::new()).unwrap();
                format!("{} {}", greeting, owner.value::<String>("req").unwrap())
            })
            .unwrap();
        assert_eq!(body, "hello GET /");
    }

    #[test]
    fn injector_rejects_registered_req() {
        let injection = Injection::setup(
            |c| {
                c.register_instance("req", 0u8)?;
                Ok(())
            },
            Options::new(),
        )
        .unwrap();

        let err = injection.injector().inject_request((), |_| ()).unwrap_err();
        assert!(matches!(err, InjectaError::PropertyCollision { .. }));
    }

    #[test]
    fn reset_statistics_clears_creations() {
        let injection = Injection::setup(
            |c| {
                c.register_transient::<Sample>(false, Args::new())?;
                Ok(())
            },
            Options::new(),
        )
        .unwrap();

        injection.resolve("sample", Args::new()).unwrap();
        assert_eq!(injection.statistics().created.total, 1);
        injection.reset_statistics();
        assert_eq!(injection.statistics().created.total, 0);
        assert_eq!(injection.statistics().registered.total, 1);
    }

    #[test]
    fn module_options_survive_setup() {
        struct Pool;

        impl Module for Pool {
            fn setup(&self, container: &mut Container, options: &ModuleOptions) -> Result<()> {
                let size = options.get::<usize>("poolSize").copied().unwrap_or_default();
                container.register_instance("poolSize", size)?;
                Ok(())
            }

            fn options(&self) -> ModuleOptions {
                ModuleOptions::new().with("poolSize", 4usize)
            }
        }

        let injection = Injection::setup(|_| Ok(()), Options::new().module(Pool)).unwrap();

        assert_eq!(injection.module_options().get::<usize>("poolSize"), Some(&4));
        assert_eq!(*injection.resolve_as::<usize>("poolSize", Args::new()).unwrap(), 4);
        let cloned = injection.clone();
        assert!(cloned.module_options().contains("poolSize"));
    }

    #[test]
    fn resolve_as_mismatch_reports_canonical_key() {
        let injection = Injection::setup(
            |c| {
                c.register_instance("Sample", 1u8)?;
                Ok(())
            },
            Options::new(),
        )
        .unwrap();

        match injection.resolve_as::<String>("Sample", Args::new()) {
            Err(InjectaError::TypeMismatch { key, .. }) => assert_eq!(key, "sample"),
            other => panic!("expected a type mismatch, got {other:?}"),
        }
    }

    #[test]
    fn debug_display() {
        let mut container = Container::new();
        container.register_instance("a", 1i32).unwrap();
        container.register_instance("b", 2i32).unwrap();
        let debug = format!("{container:?}");
        assert!(debug.contains("Container"));
        assert!(debug.contains('2'));
    }
}
