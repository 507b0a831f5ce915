//! The tagged-variant attribute value type (spec §3, §9 "Tagged-variant attribute values").
//!
//! Items are schemaless maps from attribute name to `AttributeValue`; the type
//! deliberately mirrors DynamoDB's own `AttributeValue` union rather than
//! collapsing onto `serde_json::Value`, so that number precision and the
//! distinct set/list/binary variants survive a round trip.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::common::decimal;

/// One attribute value. Numbers are stored as their original decimal text so
/// that precision is never lost to a binary float; comparisons and arithmetic
/// go through `core::common::decimal`, which works on the digit strings
/// directly rather than parsing through `f64` (see `compare`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    /// Decimal number, stored textually (e.g. `"42"`, `"-3.14"`).
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null,
    Ss(BTreeSet<String>),
    Ns(BTreeSet<String>),
    Bs(BTreeSet<Vec<u8>>),
    L(Vec<AttributeValue>),
    M(BTreeMap<String, AttributeValue>),
}

/// An item: the full attribute map for one row.
pub type Item = BTreeMap<String, AttributeValue>;

/// The scalar types a partition or sort key attribute may use (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    String,
    Number,
    Binary,
}

impl AttributeValue {
    /// A short discriminant name, used by `attribute_type(path, type)`.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Bool(_) => "BOOL",
            Self::Null => "NULL",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }

    /// Whether this value's scalar type matches the given key `ScalarType`
    /// (used when validating an item against its table's key schema).
    #[must_use]
    pub const fn matches_scalar(&self, scalar: ScalarType) -> bool {
        matches!(
            (self, scalar),
            (Self::S(_), ScalarType::String)
                | (Self::N(_), ScalarType::Number)
                | (Self::B(_), ScalarType::Binary)
        )
    }

    /// Three-way comparison between two values under the condition
    /// evaluator's semantics (spec §4.3): values of different base types
    /// never compare equal and ordering comparisons never error, they simply
    /// report `None` (the caller treats `None` as "not orderable"). Numbers
    /// compare exactly via `decimal::compare`, never through a binary float.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::N(a), Self::N(b)) => decimal::compare(a, b),
            (Self::S(a), Self::S(b)) => Some(a.cmp(b)),
            (Self::B(a), Self::B(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Equality under the evaluator's semantics: `None` (not just unequal
    /// ordering) collapses to "not equal", matching spec §4.3's "never an
    /// error, never an accidental true".
    #[must_use]
    pub fn eq_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ss(a), Self::Ss(b)) => a == b,
            (Self::Ns(a), Self::Ns(b)) => a == b,
            (Self::Bs(a), Self::Bs(b)) => a == b,
            (Self::L(a), Self::L(b)) => a == b,
            (Self::M(a), Self::M(b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// The `size(path)` function: string/binary length, set/list/map
    /// cardinality. Numbers and booleans have no size (the evaluator rejects
    /// `size` over them at evaluation time).
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::S(s) => Some(s.len()),
            Self::B(b) => Some(b.len()),
            Self::Ss(s) => Some(s.len()),
            Self::Ns(s) => Some(s.len()),
            Self::Bs(s) => Some(s.len()),
            Self::L(l) => Some(l.len()),
            Self::M(m) => Some(m.len()),
            Self::N(_) | Self::Bool(_) | Self::Null => None,
        }
    }

    /// `begins_with(path, prefix)`; only defined for `S` and `B`.
    #[must_use]
    pub fn begins_with(&self, prefix: &Self) -> bool {
        match (self, prefix) {
            (Self::S(s), Self::S(p)) => s.starts_with(p.as_str()),
            (Self::B(b), Self::B(p)) => b.starts_with(p.as_slice()),
            _ => false,
        }
    }

    /// `contains(path, value)`: substring for strings, membership for sets
    /// and lists, substring for binary.
    #[must_use]
    pub fn contains_value(&self, needle: &Self) -> bool {
        match self {
            Self::S(s) => match needle {
                Self::S(n) => s.contains(n.as_str()),
                _ => false,
            },
            Self::B(b) => match needle {
                Self::B(n) => b.windows(n.len().max(1)).any(|w| w == n.as_slice()),
                _ => false,
            },
            Self::Ss(set) => match needle {
                Self::S(n) => set.contains(n),
                _ => false,
            },
            Self::Ns(set) => match needle {
                Self::N(n) => set.contains(n),
                _ => false,
            },
            Self::Bs(set) => match needle {
                Self::B(n) => set.contains(n),
                _ => false,
            },
            Self::L(items) => items.iter().any(|v| v.eq_value(needle)),
            _ => false,
        }
    }

    /// Numeric addition used by `SET path = path + value` and bare-numeric
    /// `ADD`. Returns `None` if either side is not a number. Exact: a balance
    /// at or beyond 2^53 does not lose low-order digits, unlike going through
    /// `f64`.
    #[must_use]
    pub fn numeric_add(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::N(a), Self::N(b)) => decimal::add(a, b).map(Self::N),
            _ => None,
        }
    }

    /// Numeric subtraction, mirror of `numeric_add`.
    #[must_use]
    pub fn numeric_sub(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::N(a), Self::N(b)) => decimal::sub(a, b).map(Self::N),
            _ => None,
        }
    }

    /// Set union for `ADD` on set-typed attributes.
    #[must_use]
    pub fn set_union(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Ss(a), Self::Ss(b)) => Some(Self::Ss(a.union(b).cloned().collect())),
            (Self::Ns(a), Self::Ns(b)) => Some(Self::Ns(a.union(b).cloned().collect())),
            (Self::Bs(a), Self::Bs(b)) => Some(Self::Bs(a.union(b).cloned().collect())),
            _ => None,
        }
    }

    /// Set subtraction for `DELETE` on set-typed attributes.
    #[must_use]
    pub fn set_difference(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Ss(a), Self::Ss(b)) => Some(Self::Ss(a.difference(b).cloned().collect())),
            (Self::Ns(a), Self::Ns(b)) => Some(Self::Ns(a.difference(b).cloned().collect())),
            (Self::Bs(a), Self::Bs(b)) => Some(Self::Bs(a.difference(b).cloned().collect())),
            _ => None,
        }
    }
}
