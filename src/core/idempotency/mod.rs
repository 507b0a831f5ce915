//! TTL'd cache from client request token to a transaction's terminal outcome
//! (spec §4.6).
//!
//! Modeled on the host codebase's connection pool (`core::connection::pool`):
//! a `Mutex`-guarded map with lazy, on-access eviction rather than a
//! background sweep thread, since this cache is consulted on every tokened
//! `TransactWriteItems` call anyway.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::core::common::value::Item;
use crate::core::transaction::CancellationReason;

/// The cached result of a transaction, success or cancellation — per the
/// resolved Open Question (DESIGN.md), both outcomes are cached so a retried
/// token never re-executes.
#[derive(Debug, Clone)]
pub enum CachedOutcome {
    Committed(Vec<Option<Item>>),
    Canceled(Vec<CancellationReason>),
}



struct Entry {
    outcome: CachedOutcome,
    expires_at: Instant,
}

pub struct IdempotencyCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl IdempotencyCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached outcome for `token`, if present and unexpired.
    /// Expired entries are dropped as a side effect of the lookup.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<CachedOutcome> {
        let mut guard = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.get(token) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.outcome.clone()),
            Some(_) => {
                guard.remove(token);
                None
            }
            None => None,
        }
    }

    /// Records `outcome` for `token`, valid for this cache's TTL from now.
    pub fn put(&self, token: String, outcome: CachedOutcome) {
        let mut guard = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(token, Entry { outcome, expires_at: Instant::now() + self.ttl });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_for_unknown_token() {
        let cache = IdempotencyCache::new(Duration::from_secs(600));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn caches_committed_outcome() {
        let cache = IdempotencyCache::new(Duration::from_secs(600));
        cache.put("t1".into(), CachedOutcome::Committed(vec![None]));
        assert!(matches!(cache.get("t1"), Some(CachedOutcome::Committed(_))));
    }

    #[test]
    fn caches_canceled_outcome_too() {
        let cache = IdempotencyCache::new(Duration::from_secs(600));
        cache.put("t1".into(), CachedOutcome::Canceled(vec![CancellationReason::TransactionConflict]));
        assert!(matches!(cache.get("t1"), Some(CachedOutcome::Canceled(_))));
    }

    #[test]
    fn expired_entry_is_evicted_on_lookup() {
        let cache = IdempotencyCache::new(Duration::from_millis(1));
        cache.put("t1".into(), CachedOutcome::Committed(vec![]));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("t1").is_none());
    }
}
