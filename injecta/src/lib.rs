//! # Injecta: dependency resolution for per-request owners
//!
//! Register instances, constructors and factories under string keys, then
//! bind lifecycle-aware resolvers onto each request's owner.
//!
//! ```rust
//! use injecta::prelude::*;
//!
//! let injection = Injection::setup(
//!     |c| {
//!         c.register_instance("Greeting", "hello")?;
//!         Ok(())
//!     },
//!     Options::new(),
//! )
//! .unwrap();
//!
//! let greeting = injection.resolve_as::<&'static str>("greeting", Args::new()).unwrap();
//! assert_eq!(*greeting, "hello");
//! ```

pub use injecta_container::*;
pub use injecta_support::*;
