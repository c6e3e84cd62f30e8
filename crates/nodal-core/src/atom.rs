//! Typed property values and well-known predicates.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::path::Path;

/// A URI-like identifier used as a property predicate (e.g. `nodal:value`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    /// Wraps a URI string. No validation is performed.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the URI text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Uri {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Uri {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Well-known predicates understood by the engine.
pub mod uris {
    /// Current value of a port (float).
    pub const VALUE: &str = "nodal:value";
    /// Lower bound of a port's value range.
    pub const MIN: &str = "nodal:minimum";
    /// Upper bound of a port's value range.
    pub const MAX: &str = "nodal:maximum";
    /// Human-readable name.
    pub const NAME: &str = "nodal:name";
    /// Whether a block or graph is polyphonic.
    pub const POLYPHONIC: &str = "nodal:polyphonic";
    /// Whether a graph is enabled (processing).
    pub const ENABLED: &str = "nodal:enabled";
    /// Matches every value of a predicate in a delta removal.
    pub const WILDCARD: &str = "nodal:wildcard";
}

/// A typed property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Atom {
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 32-bit float.
    Float(f32),
    /// Plain string.
    String(String),
    /// URI reference.
    Uri(Uri),
    /// Object path reference.
    Path(Path),
}

impl Atom {
    /// The wildcard atom, which matches any value in [`Properties::apply`](crate::Properties::apply).
    pub fn wildcard() -> Self {
        Self::Uri(Uri::from(uris::WILDCARD))
    }

    /// Whether this atom is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Uri(u) if u == uris::WILDCARD)
    }

    /// Numeric value as `f32`, converting ints and bools.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Boolean value, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Uri(_) => "uri",
            Self::Path(_) => "path",
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "\"{v}\""),
            Self::Uri(v) => write!(f, "<{v}>"),
            Self::Path(v) => write!(f, "{v}"),
        }
    }
}

impl From<f32> for Atom {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Atom {
    fn from(v: f64) -> Self {
        Self::Float(v as f32)
    }
}

impl From<i32> for Atom {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Atom {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Atom {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
