//! Resolver keys and registration targets.
//!
//! Every registration ends up under a *canonical key*: the raw key run
//! through the container's [`KeyNormalizer`]. The same canonical key is the
//! property name under which the binder attaches the resolver to an owner.

use std::any::type_name;
use std::fmt;

use injecta_support::rendering::{is_plain_identifier, shorten_type_name};

use crate::error::{InjectaError, Result};

/// Maps a raw key to its canonical form.
///
/// Any `Fn(&str) -> String + Send + Sync` closure is a normalizer.
///
/// # Examples
/// ```
/// use injecta_container::key::{DefaultNormalizer, KeyNormalizer};
///
/// assert_eq!(DefaultNormalizer.normalize("NameForResolvinG"), "nameForResolvinG");
///
/// let upper = |raw: &str| raw.to_uppercase();
/// assert_eq!(upper.normalize("sample"), "SAMPLE");
/// ```
pub trait KeyNormalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> String;
}

impl<F> KeyNormalizer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn normalize(&self, raw: &str) -> String {
        self(raw)
    }
}

/// Lowercases the first word character (`[A-Za-z0-9_]` or any Unicode
/// alphanumeric) and leaves everything else untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNormalizer;

impl KeyNormalizer for DefaultNormalizer {
    fn normalize(&self, raw: &str) -> String {
        let Some((idx, ch)) = raw
            .char_indices()
            .find(|(_, c)| c.is_alphanumeric() || *c == '_')
        else {
            return raw.to_string();
        };

        let mut out = String::with_capacity(raw.len());
        out.push_str(&raw[..idx]);
        out.extend(ch.to_lowercase());
        out.push_str(&raw[idx + ch.len_utf8()..]);
        out
    }
}

/// Normalizes `raw`, rejecting keys that end up empty.
pub fn canonical_key(normalizer: &dyn KeyNormalizer, raw: &str) -> Result<String> {
    let key = normalizer.normalize(raw);
    if key.is_empty() {
        return Err(InjectaError::InvalidKey { raw: raw.to_string() });
    }
    Ok(key)
}

/// Where the raw key of a registration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// An explicit key.
    Named(String),
    /// The bare name of a Rust type, e.g. `User` for `my_app::User`.
    Type(&'static str),
}

impl KeySource {
    fn raw(&self) -> Result<String> {
        match self {
            KeySource::Named(name) => Ok(name.clone()),
            KeySource::Type(full) => {
                let short = shorten_type_name(full);
                if is_plain_identifier(&short) {
                    Ok(short)
                } else {
                    Err(InjectaError::InvalidKeyType {
                        type_name: (*full).to_string(),
                    })
                }
            }
        }
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Named(name) => write!(f, "{name}"),
            KeySource::Type(full) => write!(f, "{}", shorten_type_name(full)),
        }
    }
}

/// What a registration call is registering under.
///
/// # Examples
/// ```
/// use injecta_container::key::RegistrationTarget;
///
/// struct Mailer;
///
/// let plain: RegistrationTarget = "sample".into();
/// let tagged = RegistrationTarget::tagged("handler", ["http", "any"]);
/// let by_type = RegistrationTarget::of::<Mailer>().with_tags(["smtp"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationTarget {
    /// Untagged; the key must not be taken by another untagged registration.
    Plain(KeySource),
    /// Tagged; any number of tagged registrations may share the key.
    Tagged { key: KeySource, tags: Vec<String> },
}

impl RegistrationTarget {
    /// Target keyed by the bare name of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        RegistrationTarget::Plain(KeySource::Type(type_name::<T>()))
    }

    /// Tagged target with an explicit key.
    pub fn tagged<I, S>(key: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegistrationTarget::Tagged {
            key: KeySource::Named(key.into()),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Attaches tags, keeping the key source.
    pub fn with_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = match self {
            RegistrationTarget::Plain(key) | RegistrationTarget::Tagged { key, .. } => key,
        };
        RegistrationTarget::Tagged {
            key,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolves the canonical key and validates the tag set.
    ///
    /// Tags are copied verbatim (no normalization); duplicates are dropped
    /// keeping first occurrence.
    pub(crate) fn parse(&self, normalizer: &dyn KeyNormalizer) -> Result<ParsedTarget> {
        match self {
            RegistrationTarget::Plain(source) => Ok(ParsedTarget {
                key: canonical_key(normalizer, &source.raw()?)?,
                tags: Vec::new(),
            }),
            RegistrationTarget::Tagged { key: source, tags } => {
                let key = canonical_key(normalizer, &source.raw()?)?;
                if tags.is_empty() {
                    return Err(InjectaError::InvalidRegistrationShape {
                        key,
                        reason: "a tagged registration needs at least one tag",
                    });
                }
                let mut unique: Vec<String> = Vec::with_capacity(tags.len());
                for tag in tags {
                    if tag.is_empty() {
                        return Err(InjectaError::InvalidRegistrationShape {
                            key,
                            reason: "tags must be non-empty strings",
                        });
                    }
                    if !unique.contains(tag) {
                        unique.push(tag.clone());
                    }
                }
                Ok(ParsedTarget { key, tags: unique })
            }
        }
    }
}

impl From<&str> for RegistrationTarget {
    fn from(key: &str) -> Self {
        RegistrationTarget::Plain(KeySource::Named(key.to_string()))
    }
}

impl From<String> for RegistrationTarget {
    fn from(key: String) -> Self {
        RegistrationTarget::Plain(KeySource::Named(key))
    }
}

/// A target after normalization and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedTarget {
    pub key: String,
    pub tags: Vec<String>,
}

impl ParsedTarget {
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }
}
