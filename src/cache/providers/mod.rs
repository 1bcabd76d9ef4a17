//! Key/value store providers
//!
//! Concrete stores are wrapped in two enums for zero-cost dispatch:
//! `StoreNode` addresses one keyspace partition, `ShardedStore` routes point
//! operations across the partitions of a sharded deployment.

pub mod memory;
#[cfg(feature = "cache-redis")]
pub mod redis;
#[cfg(feature = "cache-redis")]
pub mod redis_cluster;

pub use memory::{glob_match, MemoryStore, ShardedMemoryStore};
#[cfg(feature = "cache-redis")]
pub use self::redis::RedisStore;
#[cfg(feature = "cache-redis")]
pub use self::redis_cluster::RedisClusterStore;

use super::errors::CacheResult;
use super::traits::KeyValueStore;
use std::time::Duration;

/// One directly addressable store (a single node or one shard)
#[derive(Debug, Clone)]
pub enum StoreNode {
    /// Redis node (boxed to reduce enum size)
    #[cfg(feature = "cache-redis")]
    Redis(Box<RedisStore>),

    /// In-process store
    Memory(MemoryStore),
}

impl KeyValueStore for StoreNode {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.set(key, value, ttl).await,
            Self::Memory(s) => s.set(key, value, ttl).await,
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.set_if_absent(key, value, ttl).await,
            Self::Memory(s) => s.set_if_absent(key, value, ttl).await,
        }
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.delete(keys).await,
            Self::Memory(s) => s.delete(keys).await,
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> CacheResult<bool> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.delete_if_equals(key, expected).await,
            Self::Memory(s) => s.delete_if_equals(key, expected).await,
        }
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.keys(pattern).await,
            Self::Memory(s) => s.keys(pattern).await,
        }
    }

    async fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.list(key).await,
            Self::Memory(s) => s.list(key).await,
        }
    }

    async fn push(&self, key: &str, values: &[String]) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.push(key, values).await,
            Self::Memory(s) => s.push(key, values).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.expire(key, ttl).await,
            Self::Memory(s) => s.expire(key, ttl).await,
        }
    }

    async fn flush(&self) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.flush().await,
            Self::Memory(s) => s.flush().await,
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.ping().await,
            Self::Memory(s) => s.ping().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.provider_name(),
            Self::Memory(s) => s.provider_name(),
        }
    }
}

/// A sharded keyspace seen as one store
#[derive(Debug, Clone)]
pub enum ShardedStore {
    /// Redis cluster (boxed to reduce enum size)
    #[cfg(feature = "cache-redis")]
    RedisCluster(Box<RedisClusterStore>),

    /// Hash-routed in-process shards
    Memory(ShardedMemoryStore),
}

impl ShardedStore {
    /// Every shard as a directly addressable node, in a stable order
    pub fn shard_nodes(&self) -> Vec<StoreNode> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s
                .primaries()
                .iter()
                .cloned()
                .map(|primary| StoreNode::Redis(Box::new(primary)))
                .collect(),
            Self::Memory(s) => s.shards().iter().cloned().map(StoreNode::Memory).collect(),
        }
    }
}

impl KeyValueStore for ShardedStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.set(key, value, ttl).await,
            Self::Memory(s) => s.set(key, value, ttl).await,
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.set_if_absent(key, value, ttl).await,
            Self::Memory(s) => s.set_if_absent(key, value, ttl).await,
        }
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.delete(keys).await,
            Self::Memory(s) => s.delete(keys).await,
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> CacheResult<bool> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.delete_if_equals(key, expected).await,
            Self::Memory(s) => s.delete_if_equals(key, expected).await,
        }
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.keys(pattern).await,
            Self::Memory(s) => s.keys(pattern).await,
        }
    }

    async fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.list(key).await,
            Self::Memory(s) => s.list(key).await,
        }
    }

    async fn push(&self, key: &str, values: &[String]) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.push(key, values).await,
            Self::Memory(s) => s.push(key, values).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.expire(key, ttl).await,
            Self::Memory(s) => s.expire(key, ttl).await,
        }
    }

    async fn flush(&self) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.flush().await,
            Self::Memory(s) => s.flush().await,
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.ping().await,
            Self::Memory(s) => s.ping().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::RedisCluster(s) => s.provider_name(),
            Self::Memory(s) => s.provider_name(),
        }
    }
}
