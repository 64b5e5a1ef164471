//! # Core Type Definitions
//!
//! This module contains the value types shared by every layer of the graph:
//! - Entity identity (`Uri`)
//! - Property values (`Value`)
//! - Edge records (`Edge`) and entity specs used for bulk loading (`EntitySpec`)
//! - Error types (`GraphError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use crate::query::ParseError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

// =============================================================================
// URI
// =============================================================================

/// Stable, globally unique identity of an entity.
///
/// URIs are plain strings. The debugger schema uses colon separated
/// segments (`session:1`, `frame:1:7:1000`) so they can appear bare in
/// query patterns.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    /// Create a new URI from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the URI as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Uri> for Uri {
    fn from(uri: &Uri) -> Self {
        uri.clone()
    }
}

impl Borrow<str> for Uri {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// A property value held by an entity signal.
///
/// Integers only; adapters report line/column/reference numbers as integers
/// and everything else as strings.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Value {
    /// Absent / unset.
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    /// Create a string value.
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Check if the value is `Nil`.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Borrow the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer payload, if any.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the boolean payload, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Compare against the textual literal of a query filter.
    ///
    /// Strings compare verbatim, booleans against `true`/`false`, integers
    /// against their decimal form, and `Nil` against `nil`.
    #[must_use]
    pub fn matches_text(&self, text: &str) -> bool {
        match self {
            Self::Nil => text == "nil",
            Self::Bool(b) => text.parse::<bool>().is_ok_and(|t| t == *b),
            Self::Int(i) => text.parse::<i64>().is_ok_and(|t| t == *i),
            Self::Str(s) => s == text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Nil, Into::into)
    }
}

// =============================================================================
// EDGES & SPECS
// =============================================================================

/// A typed, directed relation between two entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// The edge type (e.g. `parent`, `source`).
    pub kind: String,
    pub from: Uri,
    pub to: Uri,
}

impl Edge {
    /// Create a new edge record.
    #[must_use]
    pub fn new(kind: impl Into<String>, from: impl Into<Uri>, to: impl Into<Uri>) -> Self {
        Self {
            kind: kind.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Everything needed to create an entity: identity, type tag and
/// initial properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EntitySpec {
    pub uri: Uri,
    pub kind: String,
    #[serde(default)]
    pub props: Vec<(String, Value)>,
}

impl EntitySpec {
    /// Create a spec with no properties.
    #[must_use]
    pub fn new(uri: impl Into<Uri>, kind: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: kind.into(),
            props: Vec::new(),
        }
    }

    /// Add an initial property.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.push((name.into(), value.into()));
        self
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the graph.
///
/// `NotFound` is deliberately absent: a query resolving to nothing and a
/// lookup of a missing URI are normal outcomes, reported as `None` or an
/// empty list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An entity with this URI is already live in the store.
    #[error("URI already present in store: {0}")]
    UniqueViolation(Uri),

    /// A derived signal read itself, directly or transitively.
    #[error("Derived signal depends on itself")]
    Cycle,

    /// A query pattern could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A view was asked to follow an index the store does not define.
    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    /// The signal or view has already been disposed.
    #[error("Operation on a disposed handle")]
    StaleDispose,

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
