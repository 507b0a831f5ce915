//! Maps a partition key to a shard index (spec §4.1).

use crate::core::common::crc32;

/// `crc32(key) mod shard_count`. Only the partition key participates — the
/// sort key never affects routing, so a `Query` scoped to one partition key
/// always stays local to a single shard.
///
/// # Panics
/// Panics if `shard_count` is zero.
#[must_use]
pub fn shard_of(partition_key_serialized: &str, shard_count: u32) -> u32 {
    assert!(shard_count > 0, "shard_count must be positive");
    crc32::checksum(partition_key_serialized.as_bytes()) % shard_count
}
