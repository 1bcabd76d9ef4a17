//! # Backend Registry
//!
//! Owns one backend client and page cache per configured backend, plus the
//! circuit breaker manager they share. Built once at startup and rebuilt on
//! reconfiguration; the previous registry is closed with [`BackendRegistry::close_all`].

use super::client::BackendClient;
use super::errors::{CacheError, CacheResult};
use super::page::PageCache;
use crate::config::{ProxyCacheConfig, GLOBAL_BACKEND};
use crate::logging::log_error;
use crate::resilience::CircuitBreakerManager;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct BackendRegistry {
    pages: HashMap<String, PageCache>,
    breakers: CircuitBreakerManager,
}

impl BackendRegistry {
    /// Connect the global backend and every domain backend
    ///
    /// Fails on the first backend that cannot be connected; nothing is kept
    /// open in that case.
    pub async fn connect_all(config: &ProxyCacheConfig) -> CacheResult<Self> {
        let breakers = CircuitBreakerManager::from_config(&config.circuit_breaker_config());
        let mut registry = Self {
            pages: HashMap::new(),
            breakers,
        };

        for name in config.backend_names() {
            let cache = config.cache_for(&name);
            let client =
                match BackendClient::connect(&name, &cache, &config.mutex, &registry.breakers).await
                {
                    Ok(client) => client,
                    Err(err) => {
                        log_error("cache_registry", "connect", &err.to_string(), Some(&name));
                        registry.close_all().await;
                        return Err(err);
                    }
                };
            registry
                .pages
                .insert(name, PageCache::new(Arc::new(client), cache));
        }

        info!(backends = ?registry.names(), "✅ Cache backends connected");
        Ok(registry)
    }

    /// Client of backend `name`
    pub fn get(&self, name: &str) -> CacheResult<Arc<BackendClient>> {
        self.page_cache(name).map(|page| Arc::clone(page.client()))
    }

    /// Page cache of backend `name`
    pub fn page_cache(&self, name: &str) -> CacheResult<&PageCache> {
        self.pages
            .get(name)
            .ok_or_else(|| CacheError::UnknownBackend(name.to_string()))
    }

    /// Page cache serving `domain`: its own backend when configured, else the global one
    pub fn page_cache_for_domain(&self, domain: &str) -> CacheResult<&PageCache> {
        self.pages
            .get(domain)
            .map_or_else(|| self.page_cache(GLOBAL_BACKEND), Ok)
    }

    /// Backend names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pages.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    /// Close every backend and drop their breakers
    pub async fn close_all(&self) {
        for (name, page) in &self.pages {
            page.client().close();
            self.breakers.remove_component(name).await;
        }
        info!(backends = self.pages.len(), "Cache backends closed");
    }
}
