//! Redis cluster store provider
//!
//! Point operations go through `redis::cluster_async::ClusterConnection`,
//! which routes each command to the slot owner. Pattern queries and flushes
//! are node-local in Redis, so the store also keeps one direct `RedisStore`
//! per configured primary and runs those on every primary.

use super::redis::{self as commands, RedisStore};
use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::traits::KeyValueStore;
use crate::config::CacheConfig;
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct RedisClusterStore {
    connection: ClusterConnection,
    primaries: Vec<RedisStore>,
}

impl std::fmt::Debug for RedisClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClusterStore")
            .field("connection", &"ClusterConnection")
            .field("primaries", &self.primaries)
            .finish()
    }
}

impl RedisClusterStore {
    /// Connect to a cluster whose primaries are listed in `config.hosts`
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        if config.hosts.is_empty() {
            return Err(CacheError::Connection(
                "Redis cluster requires at least one host".to_string(),
            ));
        }

        let nodes: Vec<String> = config
            .hosts
            .iter()
            .map(|host| commands::connection_url(host, config))
            .collect();

        let mut builder = ClusterClientBuilder::new(nodes)
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .response_timeout(Duration::from_millis(config.response_timeout_ms));
        if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.password(password.to_string());
        }

        let client = builder.build().map_err(|e| {
            CacheError::Connection(format!("Failed to create Redis cluster client: {}", e))
        })?;
        let connection = client.get_async_connection().await.map_err(|e| {
            CacheError::Connection(format!("Failed to connect to Redis cluster: {}", e))
        })?;

        let mut primaries = Vec::with_capacity(config.hosts.len());
        for host in &config.hosts {
            primaries.push(RedisStore::connect(host, config).await?);
        }

        info!(shards = primaries.len(), "Redis cluster store connected");

        Ok(Self {
            connection,
            primaries,
        })
    }

    /// Direct connections to every primary, in configuration order
    pub fn primaries(&self) -> &[RedisStore] {
        &self.primaries
    }
}

impl KeyValueStore for RedisClusterStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        commands::get(&mut self.connection.clone(), key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        commands::set(&mut self.connection.clone(), key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        commands::set_if_absent(&mut self.connection.clone(), key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        // Multi-key DEL is rejected across slots, so delete one key at a time
        let mut conn = self.connection.clone();
        let mut deleted = 0;
        for key in keys {
            deleted += commands::delete(&mut conn, std::slice::from_ref(key)).await?;
        }
        Ok(deleted)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> CacheResult<bool> {
        commands::delete_if_equals(&mut self.connection.clone(), key, expected).await
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        for primary in &self.primaries {
            keys.extend(primary.keys(pattern).await?);
        }
        debug!(pattern = pattern, matched = keys.len(), "Redis cluster SCAN");
        Ok(keys)
    }

    async fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        commands::list(&mut self.connection.clone(), key).await
    }

    async fn push(&self, key: &str, values: &[String]) -> CacheResult<()> {
        commands::push(&mut self.connection.clone(), key, values).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        commands::expire(&mut self.connection.clone(), key, ttl).await
    }

    async fn flush(&self) -> CacheResult<()> {
        for primary in &self.primaries {
            primary.flush().await?;
        }
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        commands::ping(&mut self.connection.clone()).await
    }

    fn provider_name(&self) -> &'static str {
        "redis-cluster"
    }
}
