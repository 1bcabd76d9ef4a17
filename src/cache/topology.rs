//! Backend topology and wildcard fan-out
//!
//! ```text
//! Topology (enum, fixed at construction)
//!   ├── Single(StoreNode)                 <- one node, batch wildcard delete
//!   └── Sharded { router, shards }        <- point ops via router,
//!         └── Shard { node, breaker }        wildcard delete fanned out per shard
//! ```
//!
//! A wildcard delete on a sharded backend runs one future per shard and waits
//! for all of them. Each shard call goes through that shard's own circuit
//! breaker, so one failing shard neither stops the others nor trips the
//! breaker of the whole backend.

use super::errors::{CacheError, CacheResult};
use super::keys::is_mutex_key;
use super::mutex::MutexRegistry;
use super::providers::{MemoryStore, ShardedMemoryStore, ShardedStore, StoreNode};
use super::traits::KeyValueStore;
use crate::config::{CacheConfig, CacheTopology, SHARD_SUFFIX};
use crate::resilience::{CircuitBreaker, CircuitBreakerManager};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "cache-redis")]
use super::providers::{RedisClusterStore, RedisStore};

/// Which wildcard strategy a backend uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyKind {
    Single,
    Sharded,
}

/// One partition of a sharded backend
#[derive(Debug, Clone)]
pub struct Shard {
    index: usize,
    node: StoreNode,
    breaker: Arc<CircuitBreaker>,
}

impl Shard {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn node(&self) -> &StoreNode {
        &self.node
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Delete every key on this shard matching `pattern`, one key per lock cycle
    ///
    /// Lock records go through `router` so they land in the slot of the key
    /// they guard. Keys deleted before a failure are added to `deleted` either way.
    async fn delete_matching(
        &self,
        router: &ShardedStore,
        pattern: &str,
        mutexes: &MutexRegistry,
        deleted: &AtomicU64,
    ) -> CacheResult<()> {
        self.breaker
            .call(|| async {
                let keys = data_keys(self.node.keys(pattern).await?);
                if keys.is_empty() {
                    debug!(shard = self.index, pattern = pattern, "No matching keys on shard");
                    return Ok(());
                }

                for key in &keys {
                    let removed = mutexes
                        .get(key)
                        .run_locked(router, || self.node.delete(std::slice::from_ref(key)))
                        .await?;
                    deleted.fetch_add(removed, Ordering::Relaxed);
                }

                debug!(
                    shard = self.index,
                    pattern = pattern,
                    matched = keys.len(),
                    "Removed matching keys from shard"
                );
                Ok::<(), CacheError>(())
            })
            .await
            .map_err(CacheError::from)
    }
}

/// Drop mutex owner records from a key scan; they belong to live lock holders
fn data_keys(mut keys: Vec<String>) -> Vec<String> {
    keys.retain(|key| !is_mutex_key(key));
    keys
}

/// Aggregated result of a wildcard delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardOutcome {
    /// Keys removed across every shard that was reached
    pub deleted: u64,
    /// Number of shards whose call failed
    pub failed_shards: usize,
    /// Error of the lowest-indexed failed shard
    pub first_error: Option<CacheError>,
}

impl WildcardOutcome {
    pub fn is_complete(&self) -> bool {
        self.first_error.is_none()
    }

    /// The deleted count, or the first shard error if any shard failed
    pub fn into_result(self) -> CacheResult<u64> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.deleted),
        }
    }
}

/// Store connection(s) of a backend, tagged by deployment shape
#[derive(Debug, Clone)]
pub enum Topology {
    Single(StoreNode),
    Sharded {
        router: ShardedStore,
        shards: Vec<Shard>,
    },
}

impl Topology {
    /// Connect the store(s) described by `config` for backend `name`
    pub async fn connect(
        name: &str,
        config: &CacheConfig,
        breakers: &CircuitBreakerManager,
    ) -> CacheResult<Self> {
        let topology = match config.topology {
            CacheTopology::Memory if config.shards <= 1 => {
                Self::Single(StoreNode::Memory(MemoryStore::new(name)))
            }
            CacheTopology::Memory => {
                let shards = (0..config.shards)
                    .map(|i| MemoryStore::new(format!("{name}{SHARD_SUFFIX}{i}")))
                    .collect();
                Self::sharded(
                    name,
                    ShardedStore::Memory(ShardedMemoryStore::new(shards)),
                    breakers,
                )
                .await
            }
            #[cfg(feature = "cache-redis")]
            CacheTopology::Single => {
                let host = config.hosts.first().ok_or_else(|| {
                    CacheError::Connection(format!("backend '{name}' has no hosts"))
                })?;
                Self::Single(StoreNode::Redis(Box::new(
                    RedisStore::connect(host, config).await?,
                )))
            }
            #[cfg(feature = "cache-redis")]
            CacheTopology::Cluster => {
                let cluster = RedisClusterStore::connect(config).await?;
                Self::sharded(name, ShardedStore::RedisCluster(Box::new(cluster)), breakers).await
            }
            #[cfg(not(feature = "cache-redis"))]
            CacheTopology::Single | CacheTopology::Cluster => {
                return Err(CacheError::Connection(format!(
                    "backend '{name}' needs redis support (enable the cache-redis feature)"
                )));
            }
        };

        info!(
            backend = name,
            topology = ?topology.kind(),
            shards = topology.shard_count(),
            provider = topology.provider_name(),
            "Cache backend topology ready"
        );
        Ok(topology)
    }

    /// Sharded topology over `router`, with one breaker per shard from `breakers`
    pub async fn sharded(
        name: &str,
        router: ShardedStore,
        breakers: &CircuitBreakerManager,
    ) -> Self {
        let mut shards = Vec::new();
        for (index, node) in router.shard_nodes().into_iter().enumerate() {
            let breaker = breakers
                .get_circuit_breaker(&format!("{name}{SHARD_SUFFIX}{index}"))
                .await;
            shards.push(Shard {
                index,
                node,
                breaker,
            });
        }
        Self::Sharded { router, shards }
    }

    pub fn kind(&self) -> TopologyKind {
        match self {
            Self::Single(_) => TopologyKind::Single,
            Self::Sharded { .. } => TopologyKind::Sharded,
        }
    }

    pub fn shard_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Sharded { shards, .. } => shards.len(),
        }
    }

    /// Cluster-aware store of a sharded topology
    pub fn router(&self) -> Option<&ShardedStore> {
        match self {
            Self::Single(_) => None,
            Self::Sharded { router, .. } => Some(router),
        }
    }

    /// Shards of a sharded topology; empty for a single node
    pub fn shards(&self) -> &[Shard] {
        match self {
            Self::Single(_) => &[],
            Self::Sharded { shards, .. } => shards,
        }
    }

    /// Single node: match then delete the whole batch under one lock keyed by the pattern
    pub(crate) async fn delete_wildcard_single(
        node: &StoreNode,
        pattern: &str,
        mutexes: &MutexRegistry,
    ) -> CacheResult<u64> {
        mutexes
            .get(pattern)
            .run_locked(node, || async {
                let keys = data_keys(node.keys(pattern).await?);
                if keys.is_empty() {
                    return Ok(0);
                }
                node.delete(&keys).await
            })
            .await
    }

    /// Sharded: every shard concurrently, failures isolated per shard
    pub(crate) async fn delete_wildcard_sharded(
        router: &ShardedStore,
        shards: &[Shard],
        pattern: &str,
        mutexes: &MutexRegistry,
    ) -> WildcardOutcome {
        let deleted = AtomicU64::new(0);
        let results = join_all(
            shards
                .iter()
                .map(|shard| shard.delete_matching(router, pattern, mutexes, &deleted)),
        )
        .await;

        let mut failed_shards = 0;
        let mut first_error = None;
        for (shard, result) in shards.iter().zip(results) {
            if let Err(err) = result {
                warn!(
                    shard = shard.index,
                    breaker = shard.breaker.name(),
                    pattern = pattern,
                    error = %err,
                    "Wildcard delete failed on shard"
                );
                failed_shards += 1;
                first_error.get_or_insert(err);
            }
        }

        WildcardOutcome {
            deleted: deleted.load(Ordering::Relaxed),
            failed_shards,
            first_error,
        }
    }
}

impl KeyValueStore for Topology {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            Self::Single(node) => node.get(key).await,
            Self::Sharded { router, .. } => router.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            Self::Single(node) => node.set(key, value, ttl).await,
            Self::Sharded { router, .. } => router.set(key, value, ttl).await,
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        match self {
            Self::Single(node) => node.set_if_absent(key, value, ttl).await,
            Self::Sharded { router, .. } => router.set_if_absent(key, value, ttl).await,
        }
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        match self {
            Self::Single(node) => node.delete(keys).await,
            Self::Sharded { router, .. } => router.delete(keys).await,
        }
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> CacheResult<bool> {
        match self {
            Self::Single(node) => node.delete_if_equals(key, expected).await,
            Self::Sharded { router, .. } => router.delete_if_equals(key, expected).await,
        }
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        match self {
            Self::Single(node) => node.keys(pattern).await,
            Self::Sharded { router, .. } => router.keys(pattern).await,
        }
    }

    async fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        match self {
            Self::Single(node) => node.list(key).await,
            Self::Sharded { router, .. } => router.list(key).await,
        }
    }

    async fn push(&self, key: &str, values: &[String]) -> CacheResult<()> {
        match self {
            Self::Single(node) => node.push(key, values).await,
            Self::Sharded { router, .. } => router.push(key, values).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            Self::Single(node) => node.expire(key, ttl).await,
            Self::Sharded { router, .. } => router.expire(key, ttl).await,
        }
    }

    async fn flush(&self) -> CacheResult<()> {
        match self {
            Self::Single(node) => node.flush().await,
            Self::Sharded { router, .. } => router.flush().await,
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        match self {
            Self::Single(node) => node.ping().await,
            Self::Sharded { router, .. } => router.ping().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            Self::Single(node) => node.provider_name(),
            Self::Sharded { router, .. } => router.provider_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, MutexConfig};

    fn manager() -> CircuitBreakerManager {
        CircuitBreakerManager::from_config(&CircuitBreakerConfig::default())
    }

    #[tokio::test]
    async fn test_memory_topology_from_config() {
        let breakers = manager();
        let config = CacheConfig {
            topology: CacheTopology::Memory,
            shards: 3,
            ..CacheConfig::default()
        };

        let topology = Topology::connect("global", &config, &breakers).await.unwrap();
        assert_eq!(topology.kind(), TopologyKind::Sharded);
        assert_eq!(topology.shard_count(), 3);
        assert_eq!(topology.shards()[2].breaker().name(), "global#shard-2");

        let single = CacheConfig {
            topology: CacheTopology::Memory,
            ..CacheConfig::default()
        };
        let topology = Topology::connect("global", &single, &breakers).await.unwrap();
        assert_eq!(topology.kind(), TopologyKind::Single);
        assert!(topology.shards().is_empty());
    }

    #[tokio::test]
    async fn test_single_wildcard_deletes_batch() {
        let node = StoreNode::Memory(MemoryStore::default());
        for key in ["DATA@@a", "DATA@@a@@en", "DATA@@b"] {
            node.set(key, "v", Duration::ZERO).await.unwrap();
        }
        let mutexes = MutexRegistry::new("global", &MutexConfig::default());

        let deleted = Topology::delete_wildcard_single(&node, "DATA@@a*", &mutexes)
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(node.keys("*").await.unwrap(), vec!["DATA@@b"]);

        let none = Topology::delete_wildcard_single(&node, "nothing*", &mutexes)
            .await
            .unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn test_single_wildcard_skips_lock_records() {
        let node = StoreNode::Memory(MemoryStore::default());
        for key in ["DATA@@/a", "DATA@@/b"] {
            node.set(key, "v", Duration::ZERO).await.unwrap();
        }
        let mutexes = MutexRegistry::new("global", &MutexConfig::default());
        let writer = mutexes.get("DATA@@/c");
        let lease = writer.lock(&node).await.unwrap();

        let deleted = Topology::delete_wildcard_single(&node, "*", &mutexes)
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(node.keys("*").await.unwrap(), vec![writer.record_key()]);

        writer.unlock(&node, lease).await.unwrap();
    }

    #[tokio::test]
    async fn test_sharded_wildcard_zero_matches() {
        let breakers = manager();
        let router = ShardedStore::Memory(ShardedMemoryStore::with_shards(3));
        let topology = Topology::sharded("global", router.clone(), &breakers).await;
        let mutexes = MutexRegistry::new("global", &MutexConfig::default());

        let outcome =
            Topology::delete_wildcard_sharded(&router, topology.shards(), "DATA@@*", &mutexes)
                .await;
        assert_eq!(
            outcome,
            WildcardOutcome {
                deleted: 0,
                failed_shards: 0,
                first_error: None,
            }
        );
        assert_eq!(outcome.into_result(), Ok(0));
    }
}
