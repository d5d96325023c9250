//! Core of Injecta: a string-keyed dependency resolution container.
//!
//! Registrations go into a [`Container`](container::Container) during
//! setup; the binder then attaches one lifecycle-aware resolver per key to
//! each per-request [`Owner`](binder::Owner).

pub mod args;
pub mod binder;
pub mod container;
pub mod error;
pub mod key;
pub mod lifecycle;
pub mod module;
pub mod registry;
pub mod scope;
pub mod stats;

pub use args::{Args, Value};
pub use binder::{DetachedResolver, Owner, Resolver, ResolverGroup, TagFilter};
pub use container::{Container, Injection, Injector, Options, prelude};
pub use error::{InjectaError, Result};
pub use key::{DefaultNormalizer, KeyNormalizer, RegistrationTarget};
pub use lifecycle::{Construct, Invocation};
pub use module::{Module, ModuleOptions};
pub use scope::{Lifecycle, ScopeStore};
pub use stats::{StatisticsCollector, StatisticsSnapshot};
