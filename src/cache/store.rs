//! TTL keyed store.
//!
//! # Responsibilities
//! - Hold values until their expiry instant
//! - Treat expired entries as absent on lookup
//! - Optionally purge expired entries in the background
//!
//! # Design Decisions
//! - DashMap for sharded locking; lookups never block each other
//! - No size bound and no LRU policy: expiry is the only eviction
//! - The janitor holds a `Weak` reference and exits once the store is dropped

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    /// `None` for a TTL that outlasts the clock.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A concurrent map whose entries expire.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Entry<V>>,
    default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns a clone of the value if present and not expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert or overwrite `key`, expiring after `ttl`.
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Insert with the store's default TTL.
    pub fn insert_default(&self, key: K, value: V) {
        self.insert(key, value, self.default_ttl);
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Spawn a task purging expired entries every `interval`.
    ///
    /// Returns `None` when `interval` is zero.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        let cache: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.len(), "Purged expired cache entries");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(10));
        cache.insert("a".to_string(), 1, Duration::from_secs(1));
        cache.insert_default("b".to_string(), 2);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), Some(2));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_extends_expiry() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(10));
        cache.insert("a".to_string(), 1, Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(900)).await;
        cache.insert("a".to_string(), 2, Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(900)).await;
        assert_eq!(cache.get("a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task() {
        let cache: Arc<TtlCache<String, u32>> = Arc::new(TtlCache::new(Duration::from_secs(1)));
        cache.insert_default("a".to_string(), 1);

        let handle = cache.spawn_cleanup(Duration::from_secs(5)).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_never_expires() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(1));
        cache.insert("a".to_string(), 1, Duration::MAX);
        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_no_cleanup_for_zero_interval() {
        let cache: Arc<TtlCache<String, u32>> = Arc::new(TtlCache::new(Duration::from_secs(1)));
        assert!(cache.spawn_cleanup(Duration::ZERO).is_none());
    }
}
