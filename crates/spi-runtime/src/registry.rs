//! Loader registry.
//!
//! Maps `(context identity, config root)` to a fully built [`Loader`]. The
//! registry is an explicit object: construct it once with settings and an
//! enumerator, then pass it to whoever needs loaders.
//!
//! Cache hits only take a read lock. Misses serialise on a build mutex and
//! re-check before building, so each key is resolved exactly once and no
//! caller ever observes a partially built loader.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use spi_core::{DirectoryEnumerator, FactoryRegistry, ResourceEnumerator, SpiResult};
use tracing::{debug, info};

use crate::config::SpiSettings;
use crate::loader::{Loader, LoaderKey, LoaderOptions};

/// Registry of loaders keyed by [`LoaderKey`].
pub struct SpiRegistry {
    /// Enumerator used by [`get_loader`](Self::get_loader) and
    /// [`new_loader`](Self::new_loader).
    enumerator: Arc<dyn ResourceEnumerator>,
    /// Settings the registry was built with.
    settings: SpiSettings,
    /// Options handed to every loader.
    options: LoaderOptions,
    /// Cached loaders.
    loaders: RwLock<HashMap<LoaderKey, Arc<Loader>>>,
    /// Held while building a loader for the cache.
    build_lock: Mutex<()>,
    /// Next loader id.
    next_id: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SpiRegistry {
    /// Starts building a registry.
    pub fn builder() -> SpiRegistryBuilder {
        SpiRegistryBuilder::default()
    }

    /// Returns the settings.
    pub fn settings(&self) -> &SpiSettings {
        &self.settings
    }

    /// Returns the default enumerator.
    pub fn enumerator(&self) -> &Arc<dyn ResourceEnumerator> {
        &self.enumerator
    }

    /// Returns the loader for `config_root`, building it on first request.
    ///
    /// With caching disabled this is [`new_loader`](Self::new_loader).
    pub fn get_loader(&self, config_root: &str) -> SpiResult<Arc<Loader>> {
        self.get_loader_in(Arc::clone(&self.enumerator), config_root)
    }

    /// Returns the loader for `config_root` as seen through `enumerator`.
    pub fn get_loader_in(
        &self,
        enumerator: Arc<dyn ResourceEnumerator>,
        config_root: &str,
    ) -> SpiResult<Arc<Loader>> {
        if !self.settings.cache {
            return self.new_loader_in(enumerator, config_root).map(Arc::new);
        }

        let key = LoaderKey::new(enumerator.context_id(), config_root);
        if let Some(loader) = self.cached(&key) {
            return Ok(loader);
        }

        let _build = self.build_lock.lock();
        if let Some(loader) = self.cached(&key) {
            return Ok(loader);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let loader = Arc::new(self.build(enumerator, &key.config_root)?);
        self.loaders.write().insert(key.clone(), Arc::clone(&loader));
        info!(key = %key, loader_id = loader.id(), "Cached loader");
        Ok(loader)
    }

    /// Builds a fresh loader for `config_root`, bypassing the cache.
    pub fn new_loader(&self, config_root: &str) -> SpiResult<Loader> {
        self.new_loader_in(Arc::clone(&self.enumerator), config_root)
    }

    /// Builds a fresh loader for `config_root` as seen through `enumerator`.
    pub fn new_loader_in(
        &self,
        enumerator: Arc<dyn ResourceEnumerator>,
        config_root: &str,
    ) -> SpiResult<Loader> {
        self.build(enumerator, config_root)
    }

    /// Drops the cached loader for `key`, returning it.
    ///
    /// Holders of the returned `Arc` keep a valid loader; the next request
    /// builds a new one.
    pub fn invalidate(&self, key: &LoaderKey) -> Option<Arc<Loader>> {
        let removed = self.loaders.write().remove(key);
        if removed.is_some() {
            debug!(key = %key, "Invalidated loader");
        }
        removed
    }

    /// Drops every cached loader.
    pub fn clear(&self) {
        let mut loaders = self.loaders.write();
        debug!(count = loaders.len(), "Clearing loader cache");
        loaders.clear();
    }

    /// Returns the keys of the cached loaders.
    pub fn keys(&self) -> Vec<LoaderKey> {
        let mut keys: Vec<_> = self.loaders.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns statistics about the registry.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            cached: self.loaders.read().len(),
            built: self.next_id.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            cache_enabled: self.settings.cache,
        }
    }

    fn cached(&self, key: &LoaderKey) -> Option<Arc<Loader>> {
        let loader = self.loaders.read().get(key).cloned()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(loader)
    }

    fn build(&self, enumerator: Arc<dyn ResourceEnumerator>, config_root: &str) -> SpiResult<Loader> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Loader::build(id, enumerator, config_root, &self.options)
    }
}

impl fmt::Debug for SpiRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiRegistry")
            .field("context_id", &self.enumerator.context_id())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SpiRegistry`].
#[derive(Default)]
pub struct SpiRegistryBuilder {
    enumerator: Option<Arc<dyn ResourceEnumerator>>,
    settings: SpiSettings,
    factories: Option<FactoryRegistry>,
}

impl SpiRegistryBuilder {
    /// Sets the default enumerator.
    ///
    /// Defaults to a [`DirectoryEnumerator`] over the current directory.
    pub fn enumerator(mut self, enumerator: impl ResourceEnumerator + 'static) -> Self {
        self.enumerator = Some(Arc::new(enumerator));
        self
    }

    /// Sets an already shared default enumerator.
    pub fn shared_enumerator(mut self, enumerator: Arc<dyn ResourceEnumerator>) -> Self {
        self.enumerator = Some(enumerator);
        self
    }

    /// Sets the settings.
    pub fn settings(mut self, settings: SpiSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the constructors.
    ///
    /// Defaults to every `#[implementation(...)]` linked into the binary.
    pub fn factories(mut self, factories: FactoryRegistry) -> Self {
        self.factories = Some(factories);
        self
    }

    /// Builds the registry.
    pub fn build(self) -> SpiRegistry {
        let enumerator = self
            .enumerator
            .unwrap_or_else(|| Arc::new(DirectoryEnumerator::new(["."])));
        let factories = self.factories.unwrap_or_else(FactoryRegistry::collect_all);
        debug!(
            context_id = %enumerator.context_id(),
            implementations = factories.len(),
            cache = self.settings.cache,
            "Building registry"
        );

        SpiRegistry {
            enumerator,
            options: LoaderOptions {
                overrides: Arc::new(self.settings.overrides()),
                verbosity: self.settings.verbosity,
                factories: Arc::new(factories),
            },
            settings: self.settings,
            loaders: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
            next_id: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

/// Statistics about the loader registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of cached loaders.
    pub cached: usize,
    /// Number of loaders built, cached or not.
    pub built: usize,
    /// Cache hits.
    pub hits: u64,
    /// Cache misses.
    pub misses: u64,
    /// Whether caching is enabled.
    pub cache_enabled: bool,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loaders: {} cached, {} built ({} hits, {} misses, cache {})",
            self.cached,
            self.built,
            self.hits,
            self.misses,
            if self.cache_enabled { "on" } else { "off" }
        )
    }
}

#[cfg(test)]
mod tests {
    use spi_core::EmbeddedEnumerator;

    use super::*;

    fn registry(cache: bool) -> SpiRegistry {
        SpiRegistry::builder()
            .enumerator(EmbeddedEnumerator::new("unit").with(
                "lib",
                "META-INF/spi/plugin.properties",
                "test.Filter>1=test.A\n",
            ))
            .settings(SpiSettings {
                cache,
                ..Default::default()
            })
            .factories(FactoryRegistry::new())
            .build()
    }

    #[test]
    fn test_cached_loaders_are_identical() {
        let registry = registry(true);
        let a = registry.get_loader("META-INF/spi").unwrap();
        let b = registry.get_loader("/META-INF/spi/").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let stats = registry.stats();
        assert_eq!(stats.cached, 1);
        assert_eq!(stats.built, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_uncached_loaders_are_fresh_but_equal() {
        let registry = registry(false);
        let a = registry.get_loader("").unwrap();
        let b = registry.get_loader("").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
        assert_eq!(registry.stats().cached, 0);
        assert_eq!(registry.stats().built, 2);
    }

    #[test]
    fn test_new_loader_bypasses_cache() {
        let registry = registry(true);
        let cached = registry.get_loader("").unwrap();
        let fresh = registry.new_loader("").unwrap();
        assert_eq!(*cached, fresh);
        assert_ne!(cached.id(), fresh.id());
        assert_eq!(registry.stats().cached, 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let registry = registry(true);
        let first = registry.get_loader("").unwrap();
        let removed = registry.invalidate(first.key()).unwrap();
        assert!(Arc::ptr_eq(&first, &removed));
        assert!(registry.invalidate(first.key()).is_none());

        let second = registry.get_loader("").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        registry.get_loader("other/").unwrap();
        assert_eq!(registry.keys().len(), 2);
        registry.clear();
        assert!(registry.keys().is_empty());
    }

    #[test]
    fn test_concurrent_requests_build_once() {
        let registry = registry(true);
        let loaders: Vec<Arc<Loader>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.get_loader("META-INF/spi/").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(loaders.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.stats().built, 1);
    }

    #[test]
    fn test_context_is_part_of_key() {
        let registry = registry(true);
        let default = registry.get_loader("").unwrap();
        let other: Arc<dyn ResourceEnumerator> = Arc::new(EmbeddedEnumerator::new("other"));
        let elsewhere = registry.get_loader_in(other, "").unwrap();
        assert!(!Arc::ptr_eq(&default, &elsewhere));
        assert!(elsewhere.resolved().plugins.is_empty());
        assert_eq!(registry.stats().cached, 2);
    }
}
