//! Per-role cache of the SD sets that list the role as a member
//!
//! Entries are filled lazily from the directory and invalidated (not
//! rebuilt) whenever a set's membership changes. A generation counter
//! stops a load that raced with an invalidation from publishing stale sets.

use super::types::{SdKind, SdSet};
use crate::error::Result;
use crate::store::SdSetRepository;
use crate::types::normalize;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key: (tenant, canonical role, kind)
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct ConstraintKey {
    tenant: String,
    role: String,
    kind: SdKind,
}

impl ConstraintKey {
    fn new(tenant: &str, role: &str, kind: SdKind) -> Self {
        Self {
            tenant: tenant.to_string(),
            role: normalize(role),
            kind,
        }
    }
}

/// Cached lookup result
#[derive(Debug, Clone)]
struct CachedSets {
    sets: Arc<Vec<SdSet>>,
    cached_at: Instant,
}

impl CachedSets {
    fn new(sets: Vec<SdSet>) -> Self {
        Self {
            sets: Arc::new(sets),
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.cached_at.elapsed() > ttl,
            None => false,
        }
    }
}

/// Constraint cache statistics
#[derive(Debug, Clone, Default)]
pub struct ConstraintCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub entries: usize,
    pub max_entries: usize,
}

impl ConstraintCacheStats {
    /// Calculate cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Role-keyed cache of SSD and DSD sets
pub struct ConstraintSetStore {
    repository: Arc<dyn SdSetRepository>,
    cache: DashMap<ConstraintKey, CachedSets>,
    /// `None` disables expiry
    ttl: Option<Duration>,
    capacity: usize,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
}

impl ConstraintSetStore {
    /// Create a store with default settings (10,000 entries, 300s TTL)
    pub fn new(repository: Arc<dyn SdSetRepository>) -> Self {
        Self::with_cache_settings(repository, 10_000, Some(Duration::from_secs(300)))
    }

    /// Create a store with custom cache settings
    pub fn with_cache_settings(
        repository: Arc<dyn SdSetRepository>,
        capacity: usize,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            repository,
            cache: DashMap::new(),
            ttl,
            capacity,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Sets of `kind` in `tenant` that list `role` as a direct member
    pub async fn sets_containing(
        &self,
        tenant: &str,
        role: &str,
        kind: SdKind,
    ) -> Result<Arc<Vec<SdSet>>> {
        let key = ConstraintKey::new(tenant, role, kind);

        if let Some(cached) = self.cache.get(&key) {
            if !cached.is_expired(self.ttl) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&cached.sets));
            }
            // Expired - remove from cache
            drop(cached);
            self.cache.remove(&key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation.load(Ordering::Acquire);

        let sets = self
            .repository
            .search_sets_containing(kind, &key.tenant, &key.role)
            .await?;
        debug!(
            "Loaded {} {} set(s) containing {} for tenant '{}'",
            sets.len(),
            kind,
            key.role,
            key.tenant
        );

        let entry = CachedSets::new(sets);
        let sets = Arc::clone(&entry.sets);

        // Skip publishing if an invalidation happened during the load
        if self.capacity > 0 && self.generation.load(Ordering::Acquire) == generation {
            if self.cache.len() >= self.capacity {
                self.evict();
            }
            self.cache.insert(key, entry);
        }

        Ok(sets)
    }

    /// Make room for one entry: expired entries first, then the oldest tenth
    fn evict(&self) {
        let ttl = self.ttl;
        self.cache.retain(|_, cached| !cached.is_expired(ttl));
        if self.cache.len() < self.capacity {
            return;
        }

        let mut ages: Vec<(Instant, ConstraintKey)> = self
            .cache
            .iter()
            .map(|entry| (entry.value().cached_at, entry.key().clone()))
            .collect();
        ages.sort_by_key(|(cached_at, _)| *cached_at);

        let to_remove = (self.capacity / 10).max(1);
        for (_, key) in ages.into_iter().take(to_remove) {
            self.cache.remove(&key);
        }
        self.evictions.fetch_add(to_remove as u64, Ordering::Relaxed);
        debug!("Evicted {} constraint cache entries", to_remove);
    }

    /// Union of the sets of `kind` containing any of `roles`, deduplicated by name
    pub async fn sets_containing_any<I, S>(
        &self,
        tenant: &str,
        roles: I,
        kind: SdKind,
    ) -> Result<Vec<SdSet>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::BTreeMap::new();
        for role in roles {
            for set in self.sets_containing(tenant, role.as_ref(), kind).await?.iter() {
                seen.entry(set.key()).or_insert_with(|| set.clone());
            }
        }
        Ok(seen.into_values().collect())
    }

    /// Clear one role's entry
    pub fn invalidate(&self, tenant: &str, role: &str, kind: SdKind) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.cache.remove(&ConstraintKey::new(tenant, role, kind));
    }

    /// Clear a role's SSD and DSD entries
    pub fn invalidate_role(&self, tenant: &str, role: &str) {
        self.invalidate(tenant, role, SdKind::Static);
        self.invalidate(tenant, role, SdKind::Dynamic);
    }

    /// Clear the entire cache
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.cache.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> ConstraintCacheStats {
        ConstraintCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.cache.len(),
            max_entries: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDirectory;

    async fn directory() -> Arc<InMemoryDirectory> {
        let dir = Arc::new(InMemoryDirectory::new());
        dir.create_set(&SdSet::new("Banking", SdKind::Static, ["Teller", "Auditor"], 2))
            .await
            .unwrap();
        dir.create_set(&SdSet::new("Trading", SdKind::Dynamic, ["Trader", "Auditor"], 2))
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_lazy_population_and_hits() {
        let dir = directory().await;
        let store = ConstraintSetStore::new(dir.clone());

        let first = store.sets_containing("", "teller", SdKind::Static).await.unwrap();
        let second = store.sets_containing("", "TELLER", SdKind::Static).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "Banking");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(dir.set_searches(), 1);

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let store = ConstraintSetStore::new(directory().await);
        let ssd = store.sets_containing("", "auditor", SdKind::Static).await.unwrap();
        let dsd = store.sets_containing("", "auditor", SdKind::Dynamic).await.unwrap();
        assert_eq!(ssd[0].name, "Banking");
        assert_eq!(dsd[0].name, "Trading");
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let dir = directory().await;
        let store = ConstraintSetStore::new(dir.clone());

        store.sets_containing("", "teller", SdKind::Static).await.unwrap();
        store.invalidate("", "Teller", SdKind::Static);
        assert_eq!(store.stats().entries, 0);

        store.sets_containing("", "teller", SdKind::Static).await.unwrap();
        assert_eq!(dir.set_searches(), 2);
    }

    #[tokio::test]
    async fn test_union_dedupes_by_name() {
        let store = ConstraintSetStore::new(directory().await);
        let sets = store
            .sets_containing_any("", ["teller", "auditor"], SdKind::Static)
            .await
            .unwrap();
        assert_eq!(sets.len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let dir = directory().await;
        let ttl = Some(Duration::from_millis(20));
        let store = ConstraintSetStore::with_cache_settings(dir.clone(), 100, ttl);

        store.sets_containing("", "teller", SdKind::Static).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.sets_containing("", "teller", SdKind::Static).await.unwrap();

        assert_eq!(dir.set_searches(), 2);
    }

    #[tokio::test]
    async fn test_full_cache_evicts_oldest() {
        let dir = directory().await;
        let store = ConstraintSetStore::with_cache_settings(dir.clone(), 1, None);
        store.sets_containing("", "teller", SdKind::Static).await.unwrap();

        // A full cache still admits new roles
        store.sets_containing("", "auditor", SdKind::Static).await.unwrap();
        store.sets_containing("", "auditor", SdKind::Static).await.unwrap();
        assert_eq!(dir.set_searches(), 2);

        let stats = store.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.evictions, 1);

        // Teller was the oldest and went first
        store.sets_containing("", "teller", SdKind::Static).await.unwrap();
        assert_eq!(dir.set_searches(), 3);
    }

    #[tokio::test]
    async fn test_eviction_prefers_expired_entries() {
        let dir = directory().await;
        let ttl = Some(Duration::from_millis(200));
        let store = ConstraintSetStore::with_cache_settings(dir.clone(), 2, ttl);
        store.sets_containing("", "teller", SdKind::Static).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        store.sets_containing("", "auditor", SdKind::Static).await.unwrap();

        // Trader fills the cache; the expired teller entry makes room for it
        store.sets_containing("", "trader", SdKind::Dynamic).await.unwrap();
        let stats = store.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.evictions, 0);

        store.sets_containing("", "auditor", SdKind::Static).await.unwrap();
        assert_eq!(store.stats().hits, 1);
    }
}
