//! Row locking and the cross-shard two-phase-commit coordinator (spec §4.4, §4.5).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod coordinator;
pub mod lock;

pub use coordinator::{CancellationReason, OpKind, ResolvedOp, TransactionCoordinator};
pub use lock::{Intent, LockManager};

/// The exponential-backoff schedule for retrying a conflicted lock
/// acquisition (spec §4.5 step 1.4), shared by the coordinator's multi-op
/// path and each shard's single-op convenience methods.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub budget: Duration,
}

/// Generates a transaction id: `monotonic_timestamp_ns | random_tiebreaker`
/// (spec §4.5 step 1.1), used both for multi-op transactions and for the
/// synthetic single-op transaction each non-transactional write runs under
/// (spec §4.2).
#[must_use]
pub fn next_txid() -> u64 {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0);
    let tie: u16 = rand::random();
    (nanos & !0xFFFF_u64) | u64::from(tie)
}
