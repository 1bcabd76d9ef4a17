//! Shared helpers for the integration tests

#![allow(dead_code)]

use proxy_cache::cache::{
    BackendClient, Headers, MemoryStore, PageCache, ShardedMemoryStore, ShardedStore, StoreNode,
    Topology,
};
use proxy_cache::config::{CacheConfig, CacheTopology, CircuitBreakerConfig, MutexConfig};
use proxy_cache::resilience::CircuitBreakerManager;
use std::sync::Arc;
use tracing::Level;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// In-process cache settings with `shards` partitions (1 means a single node)
pub fn memory_cache_config(shards: usize) -> CacheConfig {
    CacheConfig {
        topology: CacheTopology::Memory,
        shards,
        ..CacheConfig::default()
    }
}

/// Mutex settings that give up quickly
pub fn fast_mutex_config() -> MutexConfig {
    MutexConfig {
        expiry_ms: 2000,
        retry_count: 200,
        retry_delay_ms: 2,
        ..MutexConfig::default()
    }
}

/// Backend named `name` over the memory topology, with its breaker manager
pub async fn memory_backend(
    name: &str,
    shards: usize,
) -> (Arc<BackendClient>, CircuitBreakerManager) {
    let breakers = CircuitBreakerManager::from_config(&CircuitBreakerConfig::default());
    let client = BackendClient::connect(
        name,
        &memory_cache_config(shards),
        &fast_mutex_config(),
        &breakers,
    )
    .await
    .expect("memory backends always connect");
    (Arc::new(client), breakers)
}

/// Page cache over a memory backend
pub async fn memory_page_cache(shards: usize) -> PageCache {
    let (client, _breakers) = memory_backend("global", shards).await;
    PageCache::new(client, memory_cache_config(shards))
}

/// Memory stores behind each shard of a sharded client, in shard order
pub fn shard_stores(client: &BackendClient) -> Vec<MemoryStore> {
    client
        .topology()
        .shards()
        .iter()
        .map(|shard| match shard.node() {
            StoreNode::Memory(store) => store.clone(),
            #[allow(unreachable_patterns)]
            _ => panic!("expected a memory shard"),
        })
        .collect()
}

/// Key-routing view of a sharded memory client
pub fn memory_router(client: &BackendClient) -> ShardedMemoryStore {
    match client.topology().router() {
        Some(ShardedStore::Memory(router)) => router.clone(),
        _ => panic!("expected a sharded memory backend"),
    }
}

/// `count` keys starting with `prefix` that the router places on shard `index`
pub fn keys_owned_by(
    router: &ShardedMemoryStore,
    index: usize,
    prefix: &str,
    count: usize,
) -> Vec<String> {
    let label = router.shards()[index].label().to_string();
    (0..)
        .map(|n| format!("{prefix}{n}"))
        .filter(|key| router.shard_for(key).label() == label)
        .take(count)
        .collect()
}

/// Memory store behind a single-node client
pub fn single_store(client: &BackendClient) -> MemoryStore {
    match client.topology() {
        Topology::Single(StoreNode::Memory(store)) => store.clone(),
        _ => panic!("expected a single memory node"),
    }
}

/// Response headers of a page cacheable for a minute
pub fn cacheable_response(vary: Option<&str>) -> Headers {
    let mut headers = Headers::from([
        ("Content-Type", "text/html; charset=utf-8"),
        ("Cache-Control", "public, max-age=60"),
    ]);
    if let Some(vary) = vary {
        headers.insert("Vary", vary);
    }
    headers
}
