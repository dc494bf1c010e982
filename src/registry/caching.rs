//! Identification memoization for expensive registries.
//!
//! Hosts whose `identify` scans a large module table pay that cost once per
//! distinct value instead of once per graph edge. Entries key on cell
//! addresses, so a caching adapter should be scoped to a single encode pass;
//! addresses may be reused once the host drops graph nodes.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::value::LiveValue;

use super::{ClassDefinition, ClassRegistry, QualifiedName};

/// Fallback capacity when a configured capacity of zero is supplied.
const MIN_CACHE_ENTRIES: usize = 1024;

/// Configuration for the identification cache.
#[derive(Debug, Clone)]
pub struct RegistryCacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for RegistryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            enabled: true,
        }
    }
}

/// Hit/miss counters for the identification cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the inner registry.
    pub misses: u64,
}

/// Registry adapter that memoizes `identify` by value identity.
pub struct CachingRegistry<R> {
    inner: R,
    cache: Option<Mutex<LruCache<usize, Option<QualifiedName>>>>,
    stats: Mutex<RegistryCacheStats>,
}

impl<R: ClassRegistry> CachingRegistry<R> {
    /// Wrap a registry with the default cache configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, RegistryCacheConfig::default())
    }

    /// Wrap a registry with an explicit cache configuration.
    pub fn with_config(inner: R, config: RegistryCacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            let capacity = NonZeroUsize::new(config.max_entries)
                .unwrap_or_else(|| NonZeroUsize::new(MIN_CACHE_ENTRIES).expect("nonzero"));
            Mutex::new(LruCache::new(capacity))
        });
        Self {
            inner,
            cache,
            stats: Mutex::new(RegistryCacheStats::default()),
        }
    }

    /// The wrapped registry.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> RegistryCacheStats {
        *self.stats.lock()
    }
}

impl<R: ClassRegistry> ClassRegistry for CachingRegistry<R> {
    fn identify(&self, value: &LiveValue) -> Option<QualifiedName> {
        let Some(cache) = &self.cache else {
            return self.inner.identify(value);
        };

        let key = value.identity();
        if let Some(cached) = cache.lock().get(&key).cloned() {
            self.stats.lock().hits += 1;
            return cached;
        }

        let answer = self.inner.identify(value);
        self.stats.lock().misses += 1;
        cache.lock().put(key, answer.clone());
        answer
    }

    fn resolve(&self, name: &QualifiedName) -> Option<Arc<dyn ClassDefinition>> {
        self.inner.resolve(name)
    }
}
