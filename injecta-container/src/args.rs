//! Type-erased values and argument lists.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::{InjectaError, Result};

/// A resolved (or registered) value.
///
/// Instances are shared by reference: resolving an instance registration
/// hands out clones of the same `Arc`.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wraps `value` as a [`Value`].
pub fn value<T: Send + Sync + 'static>(value: T) -> Value {
    Arc::new(value)
}

/// Downcasts a [`Value`] resolved under `key`.
pub fn downcast<T: Send + Sync + 'static>(key: &str, value: Value) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| InjectaError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    })
}

/// Ordered, heterogeneous argument list.
///
/// Registration-time (static) arguments come first, call-time (dynamic)
/// arguments are appended after them.
///
/// # Examples
/// ```
/// use injecta_container::args::Args;
///
/// let statics = Args::new().with(0i32).with(1i32);
/// let combined = statics.concat(&Args::new().with("x"));
///
/// assert_eq!(combined.len(), 3);
/// assert_eq!(combined.get::<i32>(1), Some(&1));
/// assert_eq!(combined.get::<&str>(2), Some(&"x"));
/// ```
#[derive(Clone, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an argument.
    pub fn with<T: Send + Sync + 'static>(mut self, arg: T) -> Self {
        self.0.push(Arc::new(arg));
        self
    }

    /// Appends an already erased argument.
    pub fn with_value(mut self, arg: Value) -> Self {
        self.0.push(arg);
        self
    }

    pub fn push<T: Send + Sync + 'static>(&mut self, arg: T) {
        self.0.push(Arc::new(arg));
    }

    /// `self` followed by `tail`.
    pub fn concat(&self, tail: &Args) -> Args {
        let mut all = Vec::with_capacity(self.0.len() + tail.0.len());
        all.extend(self.0.iter().cloned());
        all.extend(tail.0.iter().cloned());
        Args(all)
    }

    /// Typed positional access; `None` if absent or of another type.
    pub fn get<T: 'static>(&self, index: usize) -> Option<&T> {
        self.0.get(index).and_then(|v| v.downcast_ref::<T>())
    }

    /// Erased positional access.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Args(values)
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Args(iter.into_iter().collect())
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("len", &self.0.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_keeps_static_first() {
        let statics = Args::new().with(0i32).with(1i32);
        let dynamic = Args::new().with(String::from("x"));
        let combined = statics.concat(&dynamic);

        assert_eq!(combined.get::<i32>(0), Some(&0));
        assert_eq!(combined.get::<i32>(1), Some(&1));
        assert_eq!(combined.get::<String>(2).map(String::as_str), Some("x"));
        // sources untouched
        assert_eq!(statics.len(), 2);
        assert_eq!(dynamic.len(), 1);
    }

    #[test]
    fn get_wrong_type_is_none() {
        let args = Args::new().with(7u8);
        assert_eq!(args.get::<i32>(0), None);
        assert_eq!(args.get::<u8>(1), None);
    }

    #[test]
    fn downcast_mismatch() {
        let v = value(42i32);
        assert!(downcast::<i32>("answer", v.clone()).is_ok());
        let err = downcast::<String>("answer", v).unwrap_err();
        assert!(matches!(err, InjectaError::TypeMismatch { .. }));
    }
}
