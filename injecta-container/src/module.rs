//! Modules: groups of related registrations applied during setup.
//!
//! Instead of one giant setup callback, split registrations by concern and
//! hand the modules to [`Options::module`](crate::container::Options::module):
//!
//! ```rust,ignore
//! let injection = Injection::setup(
//!     |c| { c.register_instance("config", Config::load())?; Ok(()) },
//!     Options::new().module(DatabaseModule).module(AuthModule),
//! )?;
//! ```
//!
//! Modules run in order after the main setup callback. Each module's own
//! options are merged into a shared [`ModuleOptions`] bag before its setup
//! runs, so later modules see what earlier ones contributed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::args::Value;
use crate::container::Container;
use crate::error::{InjectaError, Result};

/// A unit of registrations applied to a [`Container`] during setup.
pub trait Module: Send + Sync {
    /// Registers this module's dependencies.
    fn setup(&self, container: &mut Container, options: &ModuleOptions) -> Result<()>;

    /// Options this module contributes to the shared bag.
    fn options(&self) -> ModuleOptions {
        ModuleOptions::default()
    }

    /// Human-readable name for logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Named option values shared across modules. Later inserts win.
#[derive(Clone, Default)]
pub struct ModuleOptions {
    values: HashMap<String, Value>,
}

impl ModuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), Arc::new(value));
    }

    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.values.get(name)?.downcast_ref::<T>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Copies every option of `other` into `self`, overwriting same names.
    pub fn merge(&mut self, other: &ModuleOptions) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ModuleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("ModuleOptions").field("names", &names).finish()
    }
}

/// Applies `modules` in order, returning the accumulated options.
///
/// # Errors
/// [`InjectaError::Setup`] naming the first module that failed.
pub(crate) fn apply_modules(container: &mut Container, modules: &[Box<dyn Module>]) -> Result<ModuleOptions> {
    let mut accumulated = ModuleOptions::new();
    for module in modules {
        accumulated.merge(&module.options());
        debug!(module = module.name(), options = accumulated.len(), "Applying module");

        module.setup(container, &accumulated).map_err(|source| {
            warn!(module = module.name(), error = %source, "Module setup failed");
            InjectaError::Setup {
                module: module.name().to_string(),
                source: Box::new(source),
            }
        })?;
    }
    Ok(accumulated)
}
