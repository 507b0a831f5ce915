//! Per-shard row locking (spec §4.4).
//!
//! Adapted from the host codebase's `lock_manager.rs`: the shared/exclusive
//! conflict matrix and the upgrade-in-place behavior for a transaction
//! re-acquiring its own lock both carry over unchanged. New here: every lock
//! record carries an `acquired_at` timestamp and a lease, so a coordinator
//! that crashes mid-transaction does not wedge the key forever (§4.4 "lock
//! break-out").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::common::error::StoreError;

pub type LockKey = Vec<u8>;

/// Whether a lock is held for reading or writing. The shard store only ever
/// requests `Write` locks (spec §4.2 treats every op as a synthetic
/// single-item transaction); `Read` exists for completeness with §3's lock
/// record shape and is exercised directly by this module's tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Write,
}

#[derive(Debug, Clone)]
struct LockRecord {
    txid: u64,
    intent: Intent,
    acquired_at: Instant,
}

/// Manages one shard's lock table. Not a fair queue: a conflicting request
/// returns immediately and the caller (the transaction coordinator) decides
/// whether to retry.
#[derive(Debug)]
pub struct LockManager {
    lease: Duration,
    /// Queue of lock holders per key; more than one entry only occurs for
    /// concurrent `Read` holders (a `Write` entry is always alone).
    locks: HashMap<LockKey, Vec<LockRecord>>,
    held_by_txn: HashMap<u64, Vec<LockKey>>,
}

impl LockManager {
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        Self { lease, locks: HashMap::new(), held_by_txn: HashMap::new() }
    }

    fn lease_expired(&self, record: &LockRecord) -> bool {
        record.acquired_at.elapsed() >= self.lease
    }

    /// Attempts to acquire `intent` on `key` for `txid`.
    ///
    /// A `Write` request conflicts with any lock held by another live
    /// transaction; a `Read` request conflicts only with another
    /// transaction's `Write` lock. A holder whose lease has expired is
    /// dropped before conflicts are checked, so the new requester takes over
    /// unconditionally. On success, returns the txids evicted this way (spec
    /// §4.4 "lock break-out"): the caller must discard those transactions'
    /// staged writes, since they no longer hold the lock that guarded them
    /// and must be treated as aborted, not merely delayed.
    ///
    /// # Errors
    /// Returns [`StoreError::TransactionConflict`] wrapping the conflicting
    /// owner's txid if the key is live-locked by another transaction.
    pub fn acquire(
        &mut self,
        txid: u64,
        key: &LockKey,
        intent: Intent,
    ) -> Result<Vec<u64>, StoreError> {
        let expired: Vec<u64> = self
            .locks
            .get(key)
            .map(|holders| {
                holders
                    .iter()
                    .filter(|h| h.txid != txid && self.lease_expired(h))
                    .map(|h| h.txid)
                    .collect()
            })
            .unwrap_or_default();
        let holders = self.locks.entry(key.clone()).or_default();
        holders.retain(|h| h.txid == txid || !expired.contains(&h.txid));
        for stale_txid in &expired {
            if let Some(keys) = self.held_by_txn.get_mut(stale_txid) {
                keys.retain(|k| k != key);
            }
        }

        if let Some(conflicting) =
            holders.iter().find(|h| h.txid != txid && (h.intent == Intent::Write || intent == Intent::Write))
        {
            return Err(StoreError::TransactionConflict(format!(
                "key held by transaction {}",
                conflicting.txid
            )));
        }

        let already_exclusive = holders.iter().any(|h| h.txid == txid && h.intent == Intent::Write);
        let final_intent = if already_exclusive { Intent::Write } else { intent };
        holders.retain(|h| h.txid != txid);
        holders.push(LockRecord { txid, intent: final_intent, acquired_at: Instant::now() });
        self.held_by_txn.entry(txid).or_default().push(key.clone());
        Ok(expired)
    }

    /// Releases every lock held by `txid`.
    pub fn release_all(&mut self, txid: u64) {
        if let Some(keys) = self.held_by_txn.remove(&txid) {
            for key in keys {
                if let Some(holders) = self.locks.get_mut(&key) {
                    holders.retain(|h| h.txid != txid);
                    if holders.is_empty() {
                        self.locks.remove(&key);
                    }
                }
            }
        }
    }

    /// Whether `txid` is a current holder of `key` (any intent).
    #[must_use]
    pub fn is_held_by(&self, key: &LockKey, txid: u64) -> bool {
        self.locks.get(key).is_some_and(|holders| holders.iter().any(|h| h.txid == txid))
    }

    /// Whether some transaction other than `txid` currently holds `key`.
    /// Used as a last-ditch check at commit time: if a broken-out
    /// transaction re-stages and commits after another transaction has since
    /// claimed the key, its write on that key must not land.
    #[must_use]
    pub fn held_by_other(&self, key: &LockKey, txid: u64) -> bool {
        self.locks.get(key).is_some_and(|holders| holders.iter().any(|h| h.txid != txid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_from_different_transactions_do_not_conflict() {
        let mut manager = LockManager::new(Duration::from_secs(30));
        let key = b"k1".to_vec();
        manager.acquire(1, &key, Intent::Read).unwrap();
        assert!(manager.acquire(2, &key, Intent::Read).is_ok());
    }

    #[test]
    fn write_conflicts_with_any_other_lock() {
        let mut manager = LockManager::new(Duration::from_secs(30));
        let key = b"k1".to_vec();
        manager.acquire(1, &key, Intent::Read).unwrap();
        let err = manager.acquire(2, &key, Intent::Write).unwrap_err();
        assert!(matches!(err, StoreError::TransactionConflict(_)));
    }

    #[test]
    fn same_transaction_reacquiring_is_not_a_conflict() {
        let mut manager = LockManager::new(Duration::from_secs(30));
        let key = b"k1".to_vec();
        manager.acquire(1, &key, Intent::Write).unwrap();
        assert!(manager.acquire(1, &key, Intent::Write).is_ok());
        assert!(manager.is_held_by(&key, 1));
    }

    #[test]
    fn release_all_frees_every_key_for_that_transaction() {
        let mut manager = LockManager::new(Duration::from_secs(30));
        let k1 = b"k1".to_vec();
        let k2 = b"k2".to_vec();
        manager.acquire(1, &k1, Intent::Write).unwrap();
        manager.acquire(1, &k2, Intent::Write).unwrap();
        manager.release_all(1);
        assert!(manager.acquire(2, &k1, Intent::Write).is_ok());
        assert!(manager.acquire(2, &k2, Intent::Write).is_ok());
    }

    #[test]
    fn expired_lease_allows_break_out_and_reports_the_evicted_txid() {
        let mut manager = LockManager::new(Duration::from_millis(0));
        let key = b"k1".to_vec();
        manager.acquire(1, &key, Intent::Write).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let evicted = manager.acquire(2, &key, Intent::Write).unwrap();
        assert_eq!(evicted, vec![1]);
        assert!(manager.is_held_by(&key, 2));
        assert!(!manager.is_held_by(&key, 1));
    }

    #[test]
    fn fresh_acquire_with_no_break_out_reports_no_evictions() {
        let mut manager = LockManager::new(Duration::from_secs(30));
        let key = b"k1".to_vec();
        let evicted = manager.acquire(1, &key, Intent::Write).unwrap();
        assert!(evicted.is_empty());
    }
}
