use crate::core::common::error::StoreError;

/// A byte-keyed, byte-valued store with ordered iteration. The shard store
/// layers three disjoint keyspaces (items, locks, staged writes — spec §4.2)
/// on top of one instance of this trait's implementation.
pub trait KeyValueStore {
    /// Inserts or overwrites `key`.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the backing file cannot be rewritten.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;

    /// # Errors
    /// Returns [`StoreError::Io`] only in pathological read failures; a
    /// missing key is `Ok(None)`, not an error.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Removes `key`, reporting whether it was present.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the backing file cannot be rewritten.
    fn delete(&mut self, key: &[u8]) -> Result<bool, StoreError>;

    /// Yields `(key, value)` pairs in ascending key order, for the range
    /// `[start, end)`, or `[start, +inf)` when `end` is `None`.
    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)>;
}
