//! # Backend Client
//!
//! One logical handle per named cache backend. Every remote call runs inside
//! the handle's circuit breaker; mutations additionally hold the distributed
//! mutex of the key they touch for the duration of the single call.

use super::errors::{CacheError, CacheResult};
use super::mutex::MutexRegistry;
use super::topology::{Topology, WildcardOutcome};
use super::traits::KeyValueStore;
use crate::config::{CacheConfig, MutexConfig};
use crate::logging::log_cache_operation;
use crate::resilience::{CircuitBreaker, CircuitBreakerManager, CircuitState};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Handle to one backend deployment (single node or sharded)
#[derive(Debug)]
pub struct BackendClient {
    name: String,
    topology: Topology,
    breaker: Arc<CircuitBreaker>,
    mutexes: MutexRegistry,
    closed: AtomicBool,
}

impl BackendClient {
    /// Connect the backend described by `cache` and register its breaker(s) in `breakers`
    pub async fn connect(
        name: &str,
        cache: &CacheConfig,
        mutex: &MutexConfig,
        breakers: &CircuitBreakerManager,
    ) -> CacheResult<Self> {
        let topology = Topology::connect(name, cache, breakers).await?;
        let breaker = breakers.get_circuit_breaker(name).await;
        Ok(Self::from_topology(name, topology, breaker, mutex))
    }

    /// Build a handle over an already connected topology
    pub fn from_topology(
        name: impl Into<String>,
        topology: Topology,
        breaker: Arc<CircuitBreaker>,
        mutex: &MutexConfig,
    ) -> Self {
        let name = name.into();
        Self {
            mutexes: MutexRegistry::new(name.clone(), mutex),
            name,
            topology,
            breaker,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn mutexes(&self) -> &MutexRegistry {
        &self.mutexes
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Value stored under `key`; `None` when absent
    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.guarded(|| self.topology.get(key)).await
    }

    /// Store `value` under `key`; a zero `ttl` means no expiry
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mutex = self.mutexes.get(key);
        self.guarded(|| mutex.run_locked(&self.topology, || self.topology.set(key, value, ttl)))
            .await
    }

    /// Remove `key`, returning how many keys were removed (0 or 1)
    pub async fn delete(&self, key: &str) -> CacheResult<u64> {
        let mutex = self.mutexes.get(key);
        let keys = [key.to_string()];
        self.guarded(|| mutex.run_locked(&self.topology, || self.topology.delete(&keys)))
            .await
    }

    /// Full list stored under `key`; empty when absent
    pub async fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        self.guarded(|| self.topology.list(key)).await
    }

    /// Append `values` to the list under `key`
    pub async fn push(&self, key: &str, values: &[String]) -> CacheResult<()> {
        let mutex = self.mutexes.get(key);
        self.guarded(|| mutex.run_locked(&self.topology, || self.topology.push(key, values)))
            .await
    }

    /// Refresh the lifetime of `key` without rewriting it
    pub async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.guarded(|| self.topology.expire(key, ttl)).await
    }

    /// Flush every key of the backend, on all shards when sharded
    pub async fn purge_all(&self) -> CacheResult<()> {
        match self.guarded(|| self.topology.flush()).await {
            Ok(()) => {
                log_cache_operation("purge_all", &self.name, None, "ok", None, None);
                Ok(())
            }
            Err(err) => {
                let details = err.to_string();
                log_cache_operation("purge_all", &self.name, None, "failed", None, Some(&details));
                Err(err)
            }
        }
    }

    /// Liveness probe through the breaker; false when closed, open or unreachable
    pub async fn ping(&self) -> bool {
        match self.guarded(|| self.topology.ping()).await {
            Ok(()) => true,
            Err(err) => {
                debug!(backend = %self.name, error = %err, "Ping failed");
                false
            }
        }
    }

    /// Delete every key matching the glob `pattern`
    ///
    /// A single node runs one breaker-wrapped batch delete under a lock keyed
    /// by the pattern. A sharded backend fans out to every shard through the
    /// shard breakers; the outcome carries the partial count and the first
    /// shard error.
    pub async fn delete_wildcard(&self, pattern: &str) -> WildcardOutcome {
        if let Err(err) = self.ensure_open() {
            return WildcardOutcome {
                deleted: 0,
                failed_shards: 0,
                first_error: Some(err),
            };
        }

        match &self.topology {
            Topology::Single(node) => {
                let result = self
                    .guarded(|| Topology::delete_wildcard_single(node, pattern, &self.mutexes))
                    .await;
                match result {
                    Ok(deleted) => WildcardOutcome {
                        deleted,
                        failed_shards: 0,
                        first_error: None,
                    },
                    Err(err) => WildcardOutcome {
                        deleted: 0,
                        failed_shards: 1,
                        first_error: Some(err),
                    },
                }
            }
            Topology::Sharded { router, shards } => {
                Topology::delete_wildcard_sharded(router, shards, pattern, &self.mutexes).await
            }
        }
    }

    /// Stop serving; every later call fails with a backend error
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(backend = %self.name, "🔌 Cache backend closed");
        }
    }

    fn ensure_open(&self) -> CacheResult<()> {
        if self.is_closed() {
            return Err(CacheError::Backend(format!(
                "backend '{}' is closed",
                self.name
            )));
        }
        Ok(())
    }

    async fn guarded<T, F, Fut>(&self, operation: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        self.ensure_open()?;
        self.breaker.call(operation).await.map_err(CacheError::from)
    }
}
