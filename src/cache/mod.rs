//! # Distributed Cache Engine
//!
//! Turns an unreliable, possibly sharded key/value store into a cache that
//! many proxy instances can share.
//!
//! ## Architecture
//!
//! ```text
//! BackendRegistry               <- one entry per named backend
//!   └── PageCache               <- admission, Vary keys, TTL, codec
//!         └── BackendClient     <- breaker around every call, mutex around mutations
//!               └── Topology (enum)
//!                     ├── Single(StoreNode)
//!                     └── Sharded { router, shards }   <- per-shard breakers for fan-out
//! ```
//!
//! ## Design Decisions
//!
//! - **Enum dispatch** for stores and topologies: no vtable, topology fixed at construction
//! - **Fail fast**: an open breaker turns every call into `CacheError::BreakerOpen`
//!   and the proxy into an always-miss cache
//! - **Per-key mutex** records live next to the key (`mutex-{key}` hash tag)
//! - **SCAN for patterns** on Redis nodes, never `KEYS`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use proxy_cache::cache::{BackendRegistry, Headers};
//! use proxy_cache::config::ConfigManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let registry = BackendRegistry::connect_all(manager.config()).await?;
//! let pages = registry.page_cache_for_domain("example.com")?;
//!
//! let request = Headers::from([("Accept-Language", "en")]);
//! if let Some(entry) = pages.retrieve_full_page("GET", "/", &request).await? {
//!     println!("hit: {} ({} bytes)", entry.status_code, entry.body.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod errors;
pub mod headers;
pub mod keys;
pub mod mutex;
pub mod page;
pub mod providers;
pub mod registry;
pub mod topology;
pub mod traits;
pub mod ttl;

pub use client::BackendClient;
pub use codec::{decode, encode, CacheEntry};
pub use errors::{CacheError, CacheResult};
pub use headers::Headers;
pub use mutex::{DistributedMutex, LockLease, MutexOptions, MutexRegistry};
pub use page::PageCache;
pub use providers::{MemoryStore, ShardedMemoryStore, ShardedStore, StoreNode};
pub use registry::BackendRegistry;
pub use topology::{Shard, Topology, TopologyKind, WildcardOutcome};
pub use traits::KeyValueStore;
pub use ttl::resolve_ttl;

#[cfg(feature = "cache-redis")]
pub use providers::{RedisClusterStore, RedisStore};
