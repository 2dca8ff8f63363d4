//! Short-lived fetch result cache.
//!
//! Maps an account key to the last fetched result and its timestamp.
//! Entries are overwritten whole on every fresh fetch and lazily expired
//! on read; there is no eviction thread. An optional capacity bound evicts
//! the oldest entry by store time for multi-tenant deployments.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use termgate_core::{AccountKey, FetchResult};
use tracing::trace;

/// One cached fetch result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    result: Arc<FetchResult>,
    stored_at: Instant,
}

impl CacheEntry {
    pub fn new(result: Arc<FetchResult>) -> Self {
        Self {
            result,
            stored_at: Instant::now(),
        }
    }

    /// Freshness check against an injected clock, so TTL semantics are
    /// testable without sleeping.
    pub fn is_fresh_at(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.stored_at) < ttl
    }

    /// Freshness check against the wall clock.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.is_fresh_at(Instant::now(), ttl)
    }

    pub fn result(&self) -> Arc<FetchResult> {
        Arc::clone(&self.result)
    }

    pub fn stored_at(&self) -> Instant {
        self.stored_at
    }
}

/// TTL cache of last fetch results, keyed by account.
///
/// Safe for concurrent read/write across account work lines; entries for
/// different accounts are independent.
pub struct CacheStore {
    entries: DashMap<AccountKey, CacheEntry>,
    /// Capacity bound; `None` disables eviction.
    max_entries: Option<usize>,
}

impl CacheStore {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Store a fresh result, overwriting any previous entry whole.
    pub fn insert(&self, key: AccountKey, result: Arc<FetchResult>) {
        if let Some(max) = self.max_entries {
            if !self.entries.contains_key(&key) && self.entries.len() >= max {
                self.evict_oldest();
            }
        }
        self.entries.insert(key, CacheEntry::new(result));
    }

    /// Return the cached result if it is still inside the TTL window.
    ///
    /// Expired entries are removed on the way out.
    pub fn get_fresh(&self, key: &AccountKey, ttl: Duration) -> Option<Arc<FetchResult>> {
        // The read guard must drop before the expiry removal below.
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh(ttl) => return Some(entry.result()),
            Some(_) => {}
            None => return None,
        }
        trace!(account = %key, "Evicting expired cache entry");
        self.entries.remove(key);
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().stored_at())
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            trace!(account = %key, "Evicting oldest cache entry (capacity bound)");
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key(n: u64) -> AccountKey {
        AccountKey::new(n, "srv", format!("u{n}"))
    }

    fn result() -> Arc<FetchResult> {
        Arc::new(FetchResult::new(vec![], Utc::now()))
    }

    #[test]
    fn test_entry_freshness_window() {
        let entry = CacheEntry::new(result());
        let ttl = Duration::from_secs(2);

        assert!(entry.is_fresh_at(entry.stored_at(), ttl));
        assert!(entry.is_fresh_at(entry.stored_at() + Duration::from_millis(1999), ttl));
        assert!(!entry.is_fresh_at(entry.stored_at() + Duration::from_secs(2), ttl));
        assert!(!entry.is_fresh_at(entry.stored_at() + Duration::from_secs(60), ttl));
    }

    #[test]
    fn test_get_fresh_hit_and_miss() {
        let cache = CacheStore::new(None);
        let ttl = Duration::from_secs(2);

        assert!(cache.get_fresh(&key(1), ttl).is_none());

        let stored = result();
        cache.insert(key(1), Arc::clone(&stored));

        let hit = cache.get_fresh(&key(1), ttl).expect("fresh hit");
        assert!(Arc::ptr_eq(&hit, &stored));
        assert!(cache.get_fresh(&key(2), ttl).is_none());
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let cache = CacheStore::new(None);
        cache.insert(key(1), result());
        assert_eq!(cache.len(), 1);

        // Zero TTL: stored entry is immediately expired.
        assert!(cache.get_fresh(&key(1), Duration::ZERO).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_overwrites_whole_entry() {
        let cache = CacheStore::new(None);
        let ttl = Duration::from_secs(60);

        let first = result();
        let second = result();
        cache.insert(key(1), Arc::clone(&first));
        cache.insert(key(1), Arc::clone(&second));

        let hit = cache.get_fresh(&key(1), ttl).expect("hit");
        assert!(Arc::ptr_eq(&hit, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_bound_evicts_oldest() {
        let cache = CacheStore::new(Some(2));
        let ttl = Duration::from_secs(60);

        cache.insert(key(1), result());
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(key(2), result());
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(key(3), result());

        assert_eq!(cache.len(), 2);
        assert!(cache.get_fresh(&key(1), ttl).is_none());
        assert!(cache.get_fresh(&key(2), ttl).is_some());
        assert!(cache.get_fresh(&key(3), ttl).is_some());
    }

    #[test]
    fn test_overwrite_does_not_trigger_eviction() {
        let cache = CacheStore::new(Some(2));
        let ttl = Duration::from_secs(60);

        cache.insert(key(1), result());
        cache.insert(key(2), result());
        cache.insert(key(1), result());

        assert_eq!(cache.len(), 2);
        assert!(cache.get_fresh(&key(2), ttl).is_some());
    }
}
