//! Bounded-lifetime key/value stores.
//!
//! One generic [`TtlCache`] backs both the credential cache (session tokens
//! keyed by target id) and the result cache (read results keyed by
//! [`common::utils::CacheKey`]). Expiry is checked lazily on every `get` and
//! proactively by a background sweeper; both use the same age test, so an
//! entry past its TTL is never handed out even if the sweep is late.
//!
//! All operations are synchronous and never wait on I/O.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

struct Stamped<V> {
    value: V,
    inserted_at: Instant,
}

/// Concurrent map whose entries expire `ttl` after their last `set`.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: DashMap<K, Stamped<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache. `name` only shows up in logs.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Configured lifetime of an entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live value for `key`, dropping it if it has expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let expired = match self.entries.get(key) {
            Some(entry) if self.is_live(&entry) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| !self.is_live(entry));
        }
        None
    }

    /// Inserts or overwrites `key`, restarting its expiry clock.
    pub fn set(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Stamped {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Removes `key` immediately. Returns whether an entry was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).is_some()
    }

    /// Removes `key` only if its current value satisfies `predicate`.
    pub fn delete_if<Q>(&self, key: &Q, predicate: impl FnOnce(&V) -> bool) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .remove_if(key, |_, entry| predicate(&entry.value))
            .is_some()
    }

    /// Removes every entry. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entries at this instant.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.entries
            .iter()
            .filter(|entry| self.is_live(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect()
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| self.is_live(entry));
        before.saturating_sub(self.entries.len())
    }

    /// Spawns the background sweep. The task ends once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let name = self.name;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    tracing::debug!(cache = name, "Cache dropped, sweeper exiting");
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    tracing::debug!(cache = name, removed, "Expired cache entries swept");
                }
            }
        })
    }

    fn is_live(&self, entry: &Stamped<V>) -> bool {
        entry.inserted_at.elapsed() < self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> TtlCache<String, u32> {
        TtlCache::new("test", Duration::from_secs(ttl_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_respects_ttl_without_sweep() {
        let cache = cache(10);
        cache.set("a".into(), 1);
        assert_eq!(cache.get("a"), Some(1));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("a"), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_resets_clock() {
        let cache = cache(10);
        cache.set("a".into(), 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("a".into(), 2);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_snapshot_agree_with_get() {
        let cache = cache(10);
        cache.set("old".into(), 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.set("new".into(), 2);
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.snapshot(), vec![("new".to_string(), 2)]);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("old"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let cache = Arc::new(cache(10));
        let handle = cache.spawn_sweeper(Duration::from_secs(3));
        cache.set("a".into(), 1);

        tokio::time::sleep(Duration::from_secs(13) + Duration::from_millis(500)).await;
        assert_eq!(cache.len(), 0);

        drop(cache);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_delete_and_clear_are_idempotent() {
        let cache = cache(10);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.clear(), 0);
    }

    #[tokio::test]
    async fn test_delete_if_checks_current_value() {
        let cache = cache(10);
        cache.set("a".into(), 1);
        assert!(!cache.delete_if("a", |v| *v == 2));
        assert_eq!(cache.get("a"), Some(1));
        assert!(cache.delete_if("a", |v| *v == 1));
        assert!(!cache.delete_if("a", |_| true));
    }
}
