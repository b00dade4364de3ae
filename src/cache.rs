//! Process-wide cache-flush registrar.
//!
//! Anything holding cached configuration implements [`CachingObject`] and
//! registers itself with [`registrar()`]. A flush signal (SIGHUP in the
//! binary, or an explicit call) then invalidates every live registrant.

use std::sync::{Arc, LazyLock, RwLock, Weak};
use tracing::{debug, info};

/// A holder of cached state that can be invalidated wholesale.
pub trait CachingObject: Send + Sync {
    /// Drop all cached state. The next access repopulates it.
    fn flush_cache(&self);

    /// Name used in log output.
    fn cache_name(&self) -> String;
}

/// Registry of flushable caches.
///
/// Registrants are held weakly, so registering does not keep a cache alive.
/// Dead entries are pruned on every flush.
#[derive(Default)]
pub struct CacheRegistrar {
    entries: RwLock<Vec<Weak<dyn CachingObject>>>,
}

static GLOBAL: LazyLock<Arc<CacheRegistrar>> = LazyLock::new(|| Arc::new(CacheRegistrar::new()));

/// The process-wide registrar.
pub fn registrar() -> Arc<CacheRegistrar> {
    Arc::clone(&GLOBAL)
}

impl CacheRegistrar {
    /// Create an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache for flushing.
    pub fn register(&self, cache: Arc<dyn CachingObject>) {
        let name = cache.cache_name();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(Arc::downgrade(&cache));
        debug!(cache = %name, registered = entries.len(), "Cache registered");
    }

    /// Flush every live registrant. Returns how many were flushed.
    pub fn flush_all(&self) -> usize {
        // Collect strong refs first so flush callbacks run without our lock held.
        let live: Vec<Arc<dyn CachingObject>> = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.retain(|w| w.strong_count() > 0);
            entries.iter().filter_map(Weak::upgrade).collect()
        };

        for cache in &live {
            debug!(cache = %cache.cache_name(), "Flushing cache");
            cache.flush_cache();
        }

        info!(flushed = live.len(), "Cache flush complete");
        live.len()
    }

    /// Number of live registrants.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Whether no live registrant remains.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
