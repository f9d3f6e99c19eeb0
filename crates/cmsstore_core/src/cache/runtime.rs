//! Keyed runtime cache and the per-type registry.
//!
//! Entries live in one LRU list per [`CachePriority`]; capacity pressure
//! evicts the least recently used entry of the lowest non-empty tier.

use log::debug;
use lru::LruCache;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Eviction preference under capacity pressure; `Low` goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheItemPolicy {
    pub ttl: Option<Duration>,
    pub priority: CachePriority,
}

impl CacheItemPolicy {
    pub fn with_ttl(ttl: Duration, priority: CachePriority) -> Self {
        Self {
            ttl: Some(ttl),
            priority,
        }
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Tier = LruCache<String, CacheEntry>;

struct Tiers {
    low: Tier,
    normal: Tier,
    high: Tier,
}

impl Tiers {
    fn new() -> Self {
        Self {
            low: LruCache::unbounded(),
            normal: LruCache::unbounded(),
            high: LruCache::unbounded(),
        }
    }

    fn tier_mut(&mut self, priority: CachePriority) -> &mut Tier {
        match priority {
            CachePriority::Low => &mut self.low,
            CachePriority::Normal => &mut self.normal,
            CachePriority::High => &mut self.high,
        }
    }

    /// Every tier, in eviction order.
    fn all_mut(&mut self) -> [&mut Tier; 3] {
        [&mut self.low, &mut self.normal, &mut self.high]
    }

    fn len(&self) -> usize {
        self.low.len() + self.normal.len() + self.high.len()
    }

    fn pop(&mut self, key: &str) -> Option<CacheEntry> {
        self.all_mut().into_iter().find_map(|tier| tier.pop(key))
    }

    fn evict_one(&mut self) -> Option<String> {
        self.all_mut()
            .into_iter()
            .find_map(|tier| tier.pop_lru())
            .map(|(key, _)| key)
    }
}

/// Thread-safe string-keyed store of cloneable values.
pub struct RuntimeCache {
    name: String,
    capacity: usize,
    // reads refresh recency, so lookups take the write lock as well
    tiers: RwLock<Tiers>,
}

impl RuntimeCache {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            tiers: RwLock::new(Tiers::new()),
        }
    }

    /// Clone of the live value under `key`, if it has type `T`.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut tiers = self.tiers.write();
        for tier in tiers.all_mut() {
            let Some(entry) = tier.get(key) else {
                continue;
            };
            if !entry.is_expired(now) {
                return entry.value.downcast_ref::<T>().cloned();
            }
            // expired: drop it so capacity is not wasted
            tier.pop(key);
            return None;
        }
        None
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T, policy: CacheItemPolicy) {
        let key = key.into();
        let entry = CacheEntry {
            value: Arc::new(value),
            expires_at: policy.ttl.map(|ttl| Instant::now() + ttl),
        };

        let mut tiers = self.tiers.write();
        let replaced = tiers.pop(&key).is_some();
        if !replaced && tiers.len() >= self.capacity {
            if let Some(victim) = tiers.evict_one() {
                debug!(
                    "event=cache_evict module=cache status=ok cache={} key={}",
                    self.name, victim
                );
            }
        }
        tiers.tier_mut(policy.priority).put(key, entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.tiers.write().pop(key).is_some()
    }

    /// Removes every key starting with `prefix`; returns the count removed.
    pub fn remove_by_prefix(&self, prefix: &str) -> usize {
        let mut tiers = self.tiers.write();
        let mut removed = 0;
        for tier in tiers.all_mut() {
            let keys: Vec<String> = tier
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, _)| key.clone())
                .collect();
            for key in keys {
                tier.pop(&key);
                removed += 1;
            }
        }
        removed
    }

    pub fn clear(&self) {
        let mut tiers = self.tiers.write();
        for tier in tiers.all_mut() {
            tier.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.tiers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Shared owner of one [`RuntimeCache`] per cached value type.
pub struct CacheRegistry {
    capacity: usize,
    caches: RwLock<HashMap<TypeId, Arc<RuntimeCache>>>,
}

impl CacheRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            caches: RwLock::new(HashMap::new()),
        }
    }

    /// Isolated cache for values of type `T`, created on first use.
    pub fn for_type<T: 'static>(&self) -> Arc<RuntimeCache> {
        let type_id = TypeId::of::<T>();
        if let Some(cache) = self.caches.read().get(&type_id) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write();
        Arc::clone(caches.entry(type_id).or_insert_with(|| {
            Arc::new(RuntimeCache::new(
                std::any::type_name::<T>(),
                self.capacity,
            ))
        }))
    }

    pub fn clear_all(&self) {
        for cache in self.caches.read().values() {
            cache.clear();
        }
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheItemPolicy, CachePriority, CacheRegistry, RuntimeCache};
    use std::time::Duration;

    #[test]
    fn expired_entry_is_not_returned() {
        let cache = RuntimeCache::new("test", 8);
        cache.insert(
            "k",
            1_i64,
            CacheItemPolicy::with_ttl(Duration::ZERO, CachePriority::Normal),
        );
        assert_eq!(cache.get::<i64>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_lowest_priority_first() {
        let cache = RuntimeCache::new("test", 2);
        cache.insert(
            "low",
            1_i64,
            CacheItemPolicy {
                ttl: None,
                priority: CachePriority::Low,
            },
        );
        cache.insert("normal", 2_i64, CacheItemPolicy::default());
        cache.insert("next", 3_i64, CacheItemPolicy::default());

        assert_eq!(cache.get::<i64>("low"), None);
        assert_eq!(cache.get::<i64>("normal"), Some(2));
        assert_eq!(cache.get::<i64>("next"), Some(3));
    }

    #[test]
    fn capacity_evicts_least_recently_used_within_a_tier() {
        let cache = RuntimeCache::new("test", 2);
        cache.insert("a", 1_i64, CacheItemPolicy::default());
        cache.insert("b", 2_i64, CacheItemPolicy::default());
        assert_eq!(cache.get::<i64>("a"), Some(1));
        cache.insert("c", 3_i64, CacheItemPolicy::default());

        assert_eq!(cache.get::<i64>("b"), None);
        assert_eq!(cache.get::<i64>("a"), Some(1));
        assert_eq!(cache.get::<i64>("c"), Some(3));
    }

    #[test]
    fn reinserting_a_key_moves_it_to_the_new_priority() {
        let cache = RuntimeCache::new("test", 2);
        cache.insert("k", 1_i64, CacheItemPolicy::default());
        cache.insert(
            "k",
            2_i64,
            CacheItemPolicy {
                ttl: None,
                priority: CachePriority::High,
            },
        );
        cache.insert("other", 3_i64, CacheItemPolicy::default());
        cache.insert("next", 4_i64, CacheItemPolicy::default());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<i64>("k"), Some(2));
        assert_eq!(cache.get::<i64>("other"), None);
    }

    #[test]
    fn remove_by_prefix_keeps_other_keys() {
        let cache = RuntimeCache::new("test", 8);
        cache.insert("permissions_1_10", 1_i64, CacheItemPolicy::default());
        cache.insert("permissions_1_11", 1_i64, CacheItemPolicy::default());
        cache.insert("permissions_12_10", 1_i64, CacheItemPolicy::default());
        assert_eq!(cache.remove_by_prefix("permissions_1_"), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn registry_isolates_types() {
        let registry = CacheRegistry::new(8);
        registry
            .for_type::<i64>()
            .insert("k", 1_i64, CacheItemPolicy::default());
        assert!(registry.for_type::<String>().is_empty());
        assert_eq!(registry.for_type::<i64>().get::<i64>("k"), Some(1));
    }
}
