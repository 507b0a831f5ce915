//! Canonical primary-key encoding (spec §3 "Primary key", §9 "Sort-key key
//! representation").
//!
//! A row's ordering key must be comparable without round-tripping through
//! `AttributeValue`'s general encoding on every comparison, so each scalar
//! value is encoded once into a `SortableKey` byte string whose unsigned
//! lexicographic order matches the value's logical order for its declared
//! `ScalarType`.

use crate::core::common::value::{AttributeValue, ScalarType};

/// A canonicalized, orderable encoding of one scalar key value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortableKey(Vec<u8>);

impl SortableKey {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wraps already-encoded bytes back into a `SortableKey`, used when
    /// recovering a sort key from a stored row's raw storage key.
    #[must_use]
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encodes a scalar attribute value as a `SortableKey` under the given
    /// type. Numbers are encoded so that unsigned byte order matches numeric
    /// order (sign-flipped IEEE-754 big-endian, the standard trick); strings
    /// and binaries are byte-lexicographic already and pass through as-is.
    #[must_use]
    pub fn encode(value: &AttributeValue, scalar: ScalarType) -> Option<Self> {
        match (value, scalar) {
            (AttributeValue::S(s), ScalarType::String) => Some(Self(s.clone().into_bytes())),
            (AttributeValue::B(b), ScalarType::Binary) => Some(Self(b.clone())),
            (AttributeValue::N(n), ScalarType::Number) => {
                let f: f64 = n.parse().ok()?;
                Some(Self(Self::encode_number(f)))
            }
            _ => None,
        }
    }

    fn encode_number(value: f64) -> Vec<u8> {
        let bits = value.to_bits();
        let flipped = if value.is_sign_negative() { !bits } else { bits | (1u64 << 63) };
        flipped.to_be_bytes().to_vec()
    }
}

/// A shard's composite storage key: `(table, partition key, sort key)`. The
/// partition and sort segments are each `SortableKey`s so a prefix scan over
/// `(table, pk)` naturally yields sort-key order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub table: String,
    pub pk: SortableKey,
    pub sk: Option<SortableKey>,
}

impl RowKey {
    #[must_use]
    pub fn new(table: impl Into<String>, pk: SortableKey, sk: Option<SortableKey>) -> Self {
        Self { table: table.into(), pk, sk }
    }

    /// Serializes to a flat byte key suitable for a `BTreeMap<Vec<u8>, _>`
    /// keyspace: length-prefixed segments so no segment's contents can be
    /// mistaken for a delimiter.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_segment(&mut out, self.table.as_bytes());
        write_segment(&mut out, self.pk.as_bytes());
        write_segment(&mut out, self.sk.as_ref().map_or(&[][..], SortableKey::as_bytes));
        out
    }

    /// The `(table, pk)` prefix shared by every row under this partition key,
    /// with no sort-key segment appended — used to bound a partition-scoped
    /// range scan (spec §4.2 `query`).
    #[must_use]
    pub fn table_pk_prefix(table: &str, pk: &SortableKey) -> Vec<u8> {
        let mut out = Vec::new();
        write_segment(&mut out, table.as_bytes());
        write_segment(&mut out, pk.as_bytes());
        out
    }
}

fn write_segment(out: &mut Vec<u8>, segment: &[u8]) {
    out.extend_from_slice(&(segment.len() as u32).to_be_bytes());
    out.extend_from_slice(segment);
}
