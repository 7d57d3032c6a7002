//! Path elements: the opaque identifiers adapters operate on.
//!
//! A tree adapter addresses items by relative path, a DHT adapter by a
//! composite key of location, content and (for protected items) domain.
//! Both travel as one [`PathElement`] so that callers can hold adapters
//! behind the same trait; each adapter checks that it received its variant.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::Number160;

/// Separator used when joining raw key parts into an identity string.
pub const IDENTITY_SEPARATOR: char = '/';

/// An identifier for a stored item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathElement {
    /// A path relative to a tree adapter's root. Separators are significant.
    PlainPath { path: String },

    /// A key into the DHT.
    DhtKey(DhtKey),
}

impl PathElement {
    pub fn plain(path: impl Into<String>) -> Self {
        Self::PlainPath { path: path.into() }
    }

    /// Human-readable identity, used for logging and error messages.
    pub fn path(&self) -> String {
        match self {
            Self::PlainPath { path } => path.clone(),
            Self::DhtKey(key) => key.identity(),
        }
    }

    /// Short variant name for type-mismatch reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlainPath { .. } => "plain path",
            Self::DhtKey(key) if key.is_protected() => "protected dht key",
            Self::DhtKey(_) => "unprotected dht key",
        }
    }

    pub fn as_plain(&self) -> Option<&str> {
        match self {
            Self::PlainPath { path } => Some(path),
            Self::DhtKey(_) => None,
        }
    }

    pub fn as_dht_key(&self) -> Option<&DhtKey> {
        match self {
            Self::DhtKey(key) => Some(key),
            Self::PlainPath { .. } => None,
        }
    }
}

impl From<DhtKey> for PathElement {
    fn from(key: DhtKey) -> Self {
        Self::DhtKey(key)
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainPath { path } => write!(f, "{}", path),
            Self::DhtKey(key) => write!(f, "{}", key),
        }
    }
}

/// Composite DHT key.
///
/// Equality and hashing use the raw strings, so two keys built from the
/// same strings are interchangeable as map keys. The hashed routing keys
/// are derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DhtKey {
    location: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
}

impl DhtKey {
    /// A key whose writes and deletes are scoped to the domain owner.
    pub fn protected(
        location: impl Into<String>,
        content: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            content: content.into(),
            domain: Some(domain.into()),
        }
    }

    /// A key anyone may overwrite or delete.
    pub fn unprotected(location: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            content: content.into(),
            domain: None,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.domain.is_some()
    }

    /// The same location and content without a domain.
    pub fn without_domain(&self) -> DhtKey {
        DhtKey::unprotected(self.location.clone(), self.content.clone())
    }

    pub fn raw_location(&self) -> &str {
        &self.location
    }

    pub fn raw_content(&self) -> &str {
        &self.content
    }

    pub fn raw_domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn location_key(&self) -> Number160 {
        Number160::hash_str(&self.location)
    }

    pub fn content_key(&self) -> Number160 {
        Number160::hash_str(&self.content)
    }

    /// Hashed domain, `None` for unprotected keys.
    pub fn domain_key(&self) -> Option<Number160> {
        self.domain.as_deref().map(Number160::hash_str)
    }

    /// `location/content[/domain]`, distinct from the hashed routing keys.
    pub fn identity(&self) -> String {
        match &self.domain {
            Some(domain) => format!(
                "{}{sep}{}{sep}{}",
                self.location,
                self.content,
                domain,
                sep = IDENTITY_SEPARATOR
            ),
            None => format!(
                "{}{sep}{}",
                self.location,
                self.content,
                sep = IDENTITY_SEPARATOR
            ),
        }
    }
}

impl fmt::Display for DhtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity())
    }
}
