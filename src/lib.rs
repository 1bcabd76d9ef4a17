#![allow(clippy::doc_markdown)] // Allow technical terms like MessagePack, FLUSHDB in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Proxy Cache
//!
//! Resilient distributed cache engine for a caching reverse proxy.
//!
//! ## Overview
//!
//! The engine turns an unreliable, possibly sharded key/value store into a
//! shared HTTP response cache that many proxy instances can use at once:
//!
//! - **Fault isolation**: one circuit breaker per backend, and one per shard
//!   for wildcard fan-out. A failing cache degrades the proxy to cache misses.
//! - **Write serialization**: same-key mutations hold a distributed mutex
//!   stored in the backend itself.
//! - **Topology transparency**: single Redis nodes, Redis clusters and an
//!   in-process store share one client API.
//! - **HTTP semantics**: `Vary`-derived keys and TTLs resolved from
//!   `Cache-Control` and `Expires`.
//!
//! ## Module Organization
//!
//! - [`cache`] - Backend clients, page cache, codec, keys and stores
//! - [`resilience`] - Circuit breakers and their manager
//! - [`config`] - Configuration loading and validation
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proxy_cache::cache::{BackendRegistry, Headers};
//! use proxy_cache::config::ConfigManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! proxy_cache::logging::init_logging(&manager.config().logging, manager.environment());
//!
//! let registry = BackendRegistry::connect_all(manager.config()).await?;
//! let pages = registry.page_cache("global")?;
//!
//! let response = Headers::from([("Cache-Control", "max-age=300"), ("Vary", "Accept-Language")]);
//! let request = Headers::from([("Accept-Language", "en")]);
//! pages
//!     .store_full_page("GET", "/", 200, &response, &request, b"<html></html>", None)
//!     .await?;
//!
//! let hit = pages.retrieve_full_page("GET", "/", &request).await?;
//! assert!(hit.is_some());
//!
//! registry.close_all().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib                        # Unit tests
//! cargo test                              # Unit and integration tests (in-process stores)
//! REDIS_URL=redis://localhost:6379 cargo test --features test-services
//! ```

pub mod cache;
pub mod config;
pub mod logging;
pub mod resilience;

pub use cache::{
    BackendClient, BackendRegistry, CacheEntry, CacheError, CacheResult, Headers, PageCache,
};
pub use config::{ConfigManager, ConfigurationError, ProxyCacheConfig};
pub use resilience::{CircuitBreaker, CircuitBreakerManager, CircuitState};
