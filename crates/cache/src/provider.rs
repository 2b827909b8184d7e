//! Pluggable cache backends.
//!
//! [`ContextCache`] is the error-returning, async calling convention shared
//! by every backend. The in-process engine cannot fail, so its adapter
//! always answers `Ok`; the interface exists so that fallible backends (a
//! remote store, a serializing proxy) drop in without changing call sites.
//!
//! [`CacheProviderRegistry`] maps symbolic provider names to factories.
//! Construct one registry at start-up, register providers, and inject it
//! where caches are resolved; looking up a name nobody registered fails
//! with [`CacheError::NoSuchProvider`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ephemera_common::time::{Clock, SystemClock};
use parking_lot::RwLock;

use crate::config::CacheConfig;
use crate::cache::TtlCache;
use crate::errors::{CacheError, CacheResult};

/// Name under which [`register_in_memory_provider`] registers the engine.
pub const IN_MEMORY_PROVIDER: &str = "in-memory";

/// Async, error-returning cache capability shared by all backends.
///
/// Absence and failure are kept apart: `get` answers `Ok(None)` for a miss
/// and reserves `Err` for backend trouble.
#[async_trait]
pub trait ContextCache<V>: Send + Sync {
    /// Fetch a value by key.
    async fn get(&self, key: &str) -> CacheResult<Option<V>>;

    /// Store a value under a key.
    async fn set(&self, key: &str, value: V) -> CacheResult<()>;

    /// Remove all entries.
    async fn clear(&self) -> CacheResult<()>;
}

/// [`ContextCache`] adapter over the in-process [`TtlCache`].
pub struct ContextCacheAdapter<V, C = SystemClock> {
    inner: Arc<TtlCache<V, C>>,
}

impl<V, C> ContextCacheAdapter<V, C> {
    /// Wrap an in-process cache.
    pub fn new(inner: Arc<TtlCache<V, C>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<V, C> ContextCache<V> for ContextCacheAdapter<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    // The in-process engine is total; every operation answers Ok.

    async fn get(&self, key: &str) -> CacheResult<Option<V>> {
        Ok(self.inner.get(key))
    }

    async fn set(&self, key: &str, value: V) -> CacheResult<()> {
        self.inner.set(key, value);
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.inner.clear();
        Ok(())
    }
}

/// Factory producing a cache backend from a configuration root.
pub type CacheProviderFactory<V> =
    Arc<dyn Fn(&str) -> CacheResult<Arc<dyn ContextCache<V>>> + Send + Sync>;

/// Name-keyed table of cache backend factories.
///
/// Registration is expected at process start-up; resolution takes a read
/// lock and can run under load.
pub struct CacheProviderRegistry<V> {
    providers: RwLock<HashMap<String, CacheProviderFactory<V>>>,
}

impl<V> CacheProviderRegistry<V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { providers: RwLock::new(HashMap::new()) }
    }

    /// Register a factory under a provider name.
    ///
    /// Registering the same name again replaces the previous factory.
    pub fn register(&self, name: impl Into<String>, factory: CacheProviderFactory<V>) {
        let name = name.into();
        tracing::debug!(provider = %name, "cache provider registered");
        self.providers.write().insert(name, factory);
    }

    /// Returns true if a factory is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Resolve a cache backend by provider name.
    ///
    /// # Errors
    /// Returns `CacheError::NoSuchProvider` for an unregistered name, or
    /// whatever the factory itself fails with.
    pub fn create(&self, name: &str, config_root: &str) -> CacheResult<Arc<dyn ContextCache<V>>> {
        let providers = self.providers.read();
        let factory =
            providers.get(name).ok_or_else(|| CacheError::NoSuchProvider(name.to_string()))?;
        factory(config_root)
    }
}

impl<V> Default for CacheProviderRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the in-process engine under the [`IN_MEMORY_PROVIDER`] name.
///
/// The factory reads a [`CacheConfig`] from the environment under the
/// configuration root it is handed, validates it, and wraps a fresh
/// [`TtlCache`] in its [`ContextCacheAdapter`].
pub fn register_in_memory_provider<V>(registry: &CacheProviderRegistry<V>)
where
    V: Clone + Send + Sync + 'static,
{
    registry.register(
        IN_MEMORY_PROVIDER,
        Arc::new(|config_root: &str| {
            let config = CacheConfig::from_env(config_root)?;
            config.validate()?;
            let cache = Arc::new(TtlCache::from_config(&config));
            Ok(Arc::new(ContextCacheAdapter::new(cache)) as Arc<dyn ContextCache<V>>)
        }),
    );
}
