//! One shard's durable item table plus its in-memory lock table and staged
//! writes (spec §4.2).
//!
//! A single mutex wraps all three so that condition evaluation, update
//! application and lock-table edits are atomic relative to every other
//! operation on this shard — mirroring the host codebase's per-resource
//! `Mutex`-guarded pool pattern (`core::connection::pool`) rather than
//! introducing per-keyspace locking.
//!
//! Locks and staged writes are kept in memory only, never written to the
//! shard's file. Spec §4.2's restart behavior unconditionally discards both
//! on `ShardStore::open` regardless of backing representation, so an
//! in-memory table already satisfies the observable contract without the
//! bookkeeping of persisting state that is always thrown away on the very
//! next start.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::common::error::StoreError;
use crate::core::common::key::{RowKey, SortableKey};
use crate::core::common::value::Item;
use crate::core::expression::evaluator::{apply_update, evaluate_condition};
use crate::core::expression::{Condition, UpdateExpression};
use crate::core::storage::engine::{FileKvStore, KeyValueStore};
use crate::core::transaction::lock::{Intent, LockKey, LockManager};
use crate::core::transaction::{next_txid, RetryPolicy};

/// The effect a staged write will have when committed.
#[derive(Debug, Clone)]
pub enum StagedOp {
    Put(Item),
    Delete,
}

struct StagedEntry {
    row_key: RowKey,
    op: StagedOp,
}

struct Inner {
    file: FileKvStore,
    locks: LockManager,
    staged: HashMap<u64, Vec<StagedEntry>>,
}

/// Result of a bounded sort-key range scan.
pub struct QueryPage {
    pub items: Vec<Item>,
    pub last_evaluated_sk: Option<SortableKey>,
}

pub struct ShardStore {
    inner: Mutex<Inner>,
}

fn serialize_item(item: &Item) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(item).map_err(StoreError::from)
}

fn deserialize_item(bytes: &[u8]) -> Result<Item, StoreError> {
    serde_json::from_slice(bytes).map_err(StoreError::from)
}

impl ShardStore {
    /// Opens the shard's backing file, then drops every lock and staged
    /// write — a freshly-started process has no live coordinators, so every
    /// lease is vacuously expired (spec §4.2 restart behavior, §6.2).
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the backing file cannot be read.
    pub fn open(path: impl AsRef<Path>, lock_lease: Duration) -> Result<Self, StoreError> {
        let file = FileKvStore::open(path)?;
        Ok(Self { inner: Mutex::new(Inner { file, locks: LockManager::new(lock_lease), staged: HashMap::new() }) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Acquires `intent` on `row_key` for `txid` (spec §4.4). If this break
    /// the lease of another transaction, that transaction's staged writes on
    /// this shard are discarded in the same locked section: it no longer
    /// holds the lock that was guarding them, so it must be treated as
    /// aborted, not merely delayed.
    ///
    /// # Errors
    /// Returns [`StoreError::TransactionConflict`] if the key is held by
    /// another live transaction.
    pub fn acquire_lock(&self, txid: u64, row_key: &RowKey, intent: Intent) -> Result<(), StoreError> {
        let key: LockKey = row_key.to_bytes();
        let mut guard = self.lock();
        let evicted = guard.locks.acquire(txid, &key, intent)?;
        for stale_txid in evicted {
            guard.staged.remove(&stale_txid);
        }
        Ok(())
    }

    /// Releases every lock `txid` holds on this shard.
    pub fn release_locks(&self, txid: u64) {
        self.lock().locks.release_all(txid);
    }

    /// Returns the last committed image for `row_key`, never a staged one.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] or [`StoreError::Serialization`] on a
    /// corrupted record.
    pub fn read_committed(&self, row_key: &RowKey) -> Result<Option<Item>, StoreError> {
        let guard = self.lock();
        match guard.file.get(&row_key.to_bytes())? {
            Some(bytes) => Ok(Some(deserialize_item(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Records `op` as `txid`'s pending effect on `row_key`; invisible to
    /// readers until [`ShardStore::commit`].
    pub fn stage_write(&self, txid: u64, row_key: RowKey, op: StagedOp) {
        self.lock().staged.entry(txid).or_default().push(StagedEntry { row_key, op });
    }

    /// Applies every staged write for `txid` to the committed table, then
    /// clears the staged entries and releases the transaction's locks.
    ///
    /// A staged entry whose row is currently held by a different
    /// transaction is skipped rather than applied (spec §4.4): that can only
    /// happen if `txid`'s lease expired and another transaction already
    /// broke out and claimed the row, in which case `txid` is stale and its
    /// write on that row must be treated as aborted even if it re-staged
    /// after the break-out. `acquire_lock` already discards staged entries
    /// at the moment of break-out; this is the backstop for anything staged
    /// afterward.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the backing file cannot be rewritten.
    pub fn commit(&self, txid: u64) -> Result<(), StoreError> {
        let mut guard = self.lock();
        if let Some(entries) = guard.staged.remove(&txid) {
            for entry in entries {
                if guard.locks.held_by_other(&entry.row_key.to_bytes(), txid) {
                    continue;
                }
                match entry.op {
                    StagedOp::Put(item) => {
                        let bytes = serialize_item(&item)?;
                        guard.file.put(entry.row_key.to_bytes(), bytes)?;
                    }
                    StagedOp::Delete => {
                        guard.file.delete(&entry.row_key.to_bytes())?;
                    }
                }
            }
        }
        guard.locks.release_all(txid);
        Ok(())
    }

    /// Discards every staged write for `txid` and releases its locks.
    pub fn abort(&self, txid: u64) {
        let mut guard = self.lock();
        guard.staged.remove(&txid);
        guard.locks.release_all(txid);
    }

    /// Reads all committed rows for `(table, pk)`, in ascending (or,
    /// reversed, descending) sort-key order, honoring `exclusive_start_sk`
    /// and `limit` (spec §4.2 `query`).
    #[must_use]
    pub fn query(
        &self,
        table: &str,
        pk: &SortableKey,
        sk_in_range: impl Fn(Option<&SortableKey>) -> bool,
        forward: bool,
        limit: Option<usize>,
        exclusive_start_sk: Option<&SortableKey>,
    ) -> QueryPage {
        let guard = self.lock();
        let prefix_lo = RowKey::table_pk_prefix(table, pk);
        let prefix_hi = {
            let mut hi = prefix_lo.clone();
            *hi.last_mut().unwrap() = hi.last().unwrap().wrapping_add(1);
            hi
        };

        // The sort key is re-derived from each row's storage key rather than
        // its item payload, so ordering and the range predicate match what
        // was actually stored under, independent of whether the sort-key
        // attribute is present in the item in the same encoding.
        let mut keyed: Vec<(Option<SortableKey>, Item)> = guard
            .file
            .range(&prefix_lo, Some(&prefix_hi))
            .into_iter()
            .filter_map(|(key_bytes, value)| {
                let sk = extract_sort_key(&key_bytes);
                deserialize_item(&value).ok().map(|item| (sk, item))
            })
            .filter(|(sk, _)| sk_in_range(sk.as_ref()))
            .collect();

        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
        if !forward {
            keyed.reverse();
        }

        if let Some(start) = exclusive_start_sk {
            let start = start.clone();
            if forward {
                keyed.retain(|(sk, _)| sk.as_ref().map_or(true, |sk| sk > &start));
            } else {
                keyed.retain(|(sk, _)| sk.as_ref().map_or(true, |sk| sk < &start));
            }
        }

        let last_evaluated_sk = if let Some(limit) = limit {
            if keyed.len() > limit {
                keyed.truncate(limit);
                keyed.last().and_then(|(sk, _)| sk.clone())
            } else {
                None
            }
        } else {
            None
        };

        QueryPage { items: keyed.into_iter().map(|(_, item)| item).collect(), last_evaluated_sk }
    }

    fn acquire_with_retry(&self, txid: u64, row_key: &RowKey, retry: RetryPolicy) -> Result<(), StoreError> {
        let deadline = Instant::now() + retry.budget;
        let mut backoff = retry.base;
        loop {
            match self.acquire_lock(txid, row_key, Intent::Write) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if Instant::now() >= deadline {
                        return Err(err);
                    }
                    thread::sleep(backoff.min(retry.cap));
                    backoff = (backoff * 2).min(retry.cap);
                }
            }
        }
    }

    /// `put(table, item, condition?)` (spec §4.2): acquires the row's WRITE
    /// lock under a synthetic single-op transaction, checks the condition
    /// against the current committed image, stages and commits inline.
    ///
    /// # Errors
    /// Returns [`StoreError::TransactionConflict`] if the lock cannot be
    /// acquired within `retry`'s budget, or [`StoreError::ConditionalCheckFailed`]
    /// if `condition` evaluates to `false`.
    pub fn put(
        &self,
        row_key: RowKey,
        item: Item,
        condition: Option<&Condition>,
        retry: RetryPolicy,
    ) -> Result<(), StoreError> {
        let txid = next_txid();
        self.acquire_with_retry(txid, &row_key, retry)?;
        let current = self.read_committed(&row_key)?;
        let ok = condition.map_or(true, |c| evaluate_condition(c, &current.unwrap_or_default()));
        if !ok {
            self.abort(txid);
            return Err(StoreError::ConditionalCheckFailed("condition expression evaluated to false".into()));
        }
        self.stage_write(txid, row_key, StagedOp::Put(item));
        self.commit(txid)
    }

    /// `update(table, key, update_expr, condition?)` (spec §4.2); returns the
    /// new item image.
    ///
    /// # Errors
    /// Same as [`ShardStore::put`].
    pub fn update(
        &self,
        row_key: RowKey,
        update: &UpdateExpression,
        condition: Option<&Condition>,
        retry: RetryPolicy,
    ) -> Result<Item, StoreError> {
        let txid = next_txid();
        self.acquire_with_retry(txid, &row_key, retry)?;
        let current = self.read_committed(&row_key)?.unwrap_or_default();
        let ok = condition.map_or(true, |c| evaluate_condition(c, &current));
        if !ok {
            self.abort(txid);
            return Err(StoreError::ConditionalCheckFailed("condition expression evaluated to false".into()));
        }
        let new_image = apply_update(update, &current);
        self.stage_write(txid, row_key, StagedOp::Put(new_image.clone()));
        self.commit(txid)?;
        Ok(new_image)
    }

    /// `delete(table, key, condition?)` (spec §4.2).
    ///
    /// # Errors
    /// Same as [`ShardStore::put`].
    pub fn delete(
        &self,
        row_key: RowKey,
        condition: Option<&Condition>,
        retry: RetryPolicy,
    ) -> Result<(), StoreError> {
        let txid = next_txid();
        self.acquire_with_retry(txid, &row_key, retry)?;
        let current = self.read_committed(&row_key)?;
        let ok = condition.map_or(true, |c| evaluate_condition(c, &current.unwrap_or_default()));
        if !ok {
            self.abort(txid);
            return Err(StoreError::ConditionalCheckFailed("condition expression evaluated to false".into()));
        }
        self.stage_write(txid, row_key, StagedOp::Delete);
        self.commit(txid)
    }

    /// Removes every committed row belonging to `table` (used by
    /// `DeleteTable`).
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the backing file cannot be rewritten.
    pub fn delete_table_rows(&self, table: &str) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let lo = {
            let mut out = Vec::new();
            out.extend_from_slice(&(table.len() as u32).to_be_bytes());
            out.extend_from_slice(table.as_bytes());
            out
        };
        let mut hi = lo.clone();
        *hi.last_mut().unwrap() = hi.last().unwrap().wrapping_add(1);
        let keys: Vec<Vec<u8>> = guard.file.range(&lo, Some(&hi)).into_iter().map(|(k, _)| k).collect();
        for key in keys {
            guard.file.delete(&key)?;
        }
        Ok(())
    }
}

/// Strips the length-prefixed `table` and `pk` segments off a serialized
/// [`RowKey`] and decodes the remaining `sk` segment, mirroring
/// `RowKey::to_bytes`'s layout.
fn extract_sort_key(key_bytes: &[u8]) -> Option<SortableKey> {
    fn read_segment(bytes: &[u8], offset: usize) -> Option<(usize, usize)> {
        let len_bytes: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        Some((offset + 4, len))
    }
    let (table_start, table_len) = read_segment(key_bytes, 0)?;
    let (pk_start, pk_len) = read_segment(key_bytes, table_start + table_len)?;
    let (sk_start, sk_len) = read_segment(key_bytes, pk_start + pk_len)?;
    if sk_len == 0 {
        return None;
    }
    let bytes = key_bytes.get(sk_start..sk_start + sk_len)?.to_vec();
    Some(SortableKey::from_raw(bytes))
}
