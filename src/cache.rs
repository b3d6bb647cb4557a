use std::time::Duration;

use moka::sync::Cache;

/// Short-lived response cache shared by handlers through `AppState`.
pub trait ResponseCache<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn insert(&self, key: String, value: V);
    fn invalidate_all(&self);
}

/// In-process cache with a fixed time-to-live and a bounded entry count.
pub struct TtlCache<V> {
    inner: Cache<String, V>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let inner = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_entries.max(1) as u64)
            .build();
        Self { inner }
    }

    /// Entry count after pending evictions are applied.
    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> ResponseCache<V> for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key)
    }

    fn insert(&self, key: String, value: V) {
        self.inner.insert(key, value);
    }

    fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

/// Used when `STATS_CACHE_TTL_SECS` is 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

impl<V> ResponseCache<V> for DisabledCache {
    fn get(&self, _key: &str) -> Option<V> {
        None
    }

    fn insert(&self, _key: String, _value: V) {}

    fn invalidate_all(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(50), 8);
        cache.insert("agent".into(), 1u32);
        assert_eq!(cache.get("agent"), Some(1));

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get("agent"), None);
    }

    #[test]
    fn entry_count_stays_within_capacity() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        for (index, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
            cache.insert(key.into(), index);
        }

        assert!(cache.len() <= 2, "cache holds {} entries", cache.len());
    }

    #[test]
    fn overwriting_a_key_keeps_the_latest_value() {
        let cache = TtlCache::new(Duration::from_secs(60), 4);
        cache.insert("a".into(), 1u32);
        cache.insert("b".into(), 2);
        cache.insert("b".into(), 20);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), Some(20));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = TtlCache::new(Duration::from_secs(60), 4);
        cache.insert("a".into(), "x".to_string());
        cache.insert("b".into(), "y".to_string());

        cache.invalidate_all();

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn disabled_cache_never_returns_values() {
        let cache = DisabledCache;
        ResponseCache::<u32>::insert(&cache, "a".into(), 1);
        assert_eq!(ResponseCache::<u32>::get(&cache, "a"), None);
    }
}
