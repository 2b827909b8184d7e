//! Tests for backend resolution through the provider registry.

use std::sync::Arc;

use ephemera_cache::{
    register_in_memory_provider, CacheConfig, CacheError, CacheProviderRegistry, CacheResult,
    ContextCache, ContextCacheAdapter, TtlCache, IN_MEMORY_PROVIDER,
};

#[tokio::test]
async fn in_memory_provider_round_trips_through_the_context_interface() {
    let registry: CacheProviderRegistry<String> = CacheProviderRegistry::new();
    register_in_memory_provider(&registry);

    // No variables under this root: the factory falls back to defaults
    let cache = registry.create(IN_MEMORY_PROVIDER, "EPHEMERA_PROVIDER_IT").unwrap();

    cache.set("token", "abc123".to_string()).await.unwrap();
    assert_eq!(cache.get("token").await.unwrap(), Some("abc123".to_string()));
    assert_eq!(cache.get("other").await.unwrap(), None);

    cache.clear().await.unwrap();
    assert_eq!(cache.get("token").await.unwrap(), None);
}

#[tokio::test]
async fn unknown_provider_name_is_a_named_error() {
    let registry: CacheProviderRegistry<String> = CacheProviderRegistry::new();
    register_in_memory_provider(&registry);

    let err = registry.create("redis", "EPHEMERA_PROVIDER_IT").err().unwrap();
    assert_eq!(err.to_string(), "No such provider registered: redis");
    assert!(matches!(err, CacheError::NoSuchProvider(_)));
}

#[tokio::test]
async fn invalid_environment_configuration_fails_resolution() {
    std::env::set_var("EPHEMERA_PROVIDER_BAD_EXPIRE_LIMIT", "0");

    let registry: CacheProviderRegistry<String> = CacheProviderRegistry::new();
    register_in_memory_provider(&registry);

    let err = registry.create(IN_MEMORY_PROVIDER, "EPHEMERA_PROVIDER_BAD").err().unwrap();
    assert!(matches!(err, CacheError::Config(_)));
}

/// A caller-supplied provider wrapping a pre-built cache shares the same
/// calling convention as the built-in one.
#[tokio::test]
async fn custom_provider_factory_resolves_a_prebuilt_backend() {
    let config = CacheConfig { ttl_secs: 60, ..CacheConfig::default() };
    let prebuilt = Arc::new(TtlCache::from_config(&config));
    prebuilt.set("seeded", 7_u32);

    let adapter: Arc<dyn ContextCache<u32>> = Arc::new(ContextCacheAdapter::new(prebuilt));

    let registry: CacheProviderRegistry<u32> = CacheProviderRegistry::new();
    let shared = adapter.clone();
    registry.register(
        "prebuilt",
        Arc::new(move |_: &str| -> CacheResult<Arc<dyn ContextCache<u32>>> {
            Ok(shared.clone())
        }),
    );

    let resolved = registry.create("prebuilt", "").unwrap();
    assert_eq!(resolved.get("seeded").await.unwrap(), Some(7));
}
