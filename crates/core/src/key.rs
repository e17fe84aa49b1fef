//! Tagged scalar key values
//!
//! Every indexed field of a record carries a `KeyValue`, tagged with its
//! `KeyKind`. The kinds are frozen:
//! - `Int`: 64-bit signed integer
//! - `Str`: UTF-8 string
//! - `Ticks`: a date, stored as integer ticks
//!
//! ## Type Rules
//!
//! - No implicit coercions: `Int(1)` never equals `Ticks(1)`.
//! - Values of different kinds never satisfy a range predicate; query
//!   validation rejects mixed-kind comparisons before evaluation.
//! - `Ord` is total (kind discriminant first, then value) so `KeyValue`
//!   can key a `BTreeMap`, but cross-kind ordering is an internal detail
//!   and never observable through a validated query.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data kind of a key value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    /// 64-bit signed integer
    Int,
    /// UTF-8 string
    Str,
    /// Date as integer ticks
    Ticks,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyKind::Int => "Int",
            KeyKind::Str => "Str",
            KeyKind::Ticks => "Ticks",
        };
        write!(f, "{}", s)
    }
}

/// A scalar key value extracted from a record
///
/// Ordering is total: values of the same kind order by value, values of
/// different kinds order by kind discriminant. Equality across kinds is
/// always false.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyValue {
    /// 64-bit signed integer
    Int(i64),
    /// UTF-8 string
    Str(String),
    /// Date as integer ticks
    Ticks(i64),
}

impl KeyValue {
    /// Get the kind tag of this value
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyValue::Int(_) => KeyKind::Int,
            KeyValue::Str(_) => KeyKind::Str,
            KeyValue::Ticks(_) => KeyKind::Ticks,
        }
    }

    /// Build a string key value
    pub fn str(s: impl Into<String>) -> Self {
        KeyValue::Str(s.into())
    }
}

// Display is used in error messages ("not found: Item/42") and log lines.
impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Str(v) => write!(f, "{}", v),
            KeyValue::Ticks(v) => write!(f, "#{}", v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Str(v)
    }
}
