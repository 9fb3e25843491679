//! Attribute Value Types
//!
//! Nodes carry a flexible metadata bag (`attributes`) whose values are
//! restricted to a small tagged-variant type rather than arbitrary JSON.
//! This keeps the bag schemaless at the key level while still letting the
//! store declare typed index dimensions and validate writes against them.
//!
//! # Serialization
//!
//! `AttributeValue` serializes untagged, so persisted records read as plain
//! JSON scalars and arrays:
//!
//! ```rust
//! use nodeverse_core::models::AttributeValue;
//!
//! let v: AttributeValue = serde_json::from_str("5").unwrap();
//! assert_eq!(v, AttributeValue::Int(5));
//!
//! let v: AttributeValue = serde_json::from_str("5.5").unwrap();
//! assert_eq!(v, AttributeValue::Float(5.5));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single attribute value: scalar or array-of-scalars.
///
/// Variant order matters for untagged deserialization: integers must be
/// tried before floats so that `5` parses as `Int(5)`, not `Float(5.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating-point number
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Array of values (nested arrays are representable but discouraged)
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// The declared type this value conforms to
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::Bool(_) => AttributeType::Bool,
            AttributeValue::Int(_) => AttributeType::Int,
            AttributeValue::Float(_) => AttributeType::Float,
            AttributeValue::Str(_) => AttributeType::Str,
            AttributeValue::List(_) => AttributeType::List,
        }
    }

    /// Borrow as string, if this is a `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract as i64, if this is an `Int`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract as f64, if this is a `Float`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Extract as bool, if this is a `Bool`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Str(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Float(x) => write!(f, "{x}"),
            AttributeValue::Str(s) => write!(f, "{s}"),
            AttributeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Declared type for an attribute key (per-kind namespace or index dimension)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Bool,
    Int,
    Float,
    Str,
    List,
}

impl AttributeType {
    /// Whether values of this type have a total order usable by range
    /// indices. `Bool` is excluded (a two-value range is an exact match in
    /// disguise) and `List` values are not indexable at all.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            AttributeType::Int | AttributeType::Float | AttributeType::Str
        )
    }

    /// Whether values of this type can be used as index keys
    pub fn is_indexable(&self) -> bool {
        !matches!(self, AttributeType::List)
    }

    /// Strict conformance check: the value's variant must match exactly.
    /// An `Int` does not satisfy a declared `Float` dimension.
    pub fn matches(&self, value: &AttributeValue) -> bool {
        value.attribute_type() == *self
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::Bool => "bool",
            AttributeType::Int => "int",
            AttributeType::Float => "float",
            AttributeType::Str => "str",
            AttributeType::List => "list",
        };
        write!(f, "{name}")
    }
}
