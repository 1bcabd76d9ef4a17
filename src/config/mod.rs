//! # Proxy Cache Configuration
//!
//! Typed settings for the cache engine, deserialized with serde and layered by
//! the `config` crate: defaults, then an optional TOML/YAML file, then
//! `PROXY_CACHE__*` environment variables.
//!
//! Every named backend ("domain") may override the global `cache` and
//! `circuit_breaker` sections. Cache overrides are merged field by field; a
//! circuit breaker override replaces the global settings as a whole.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use proxy_cache::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let cache = manager.config().cache_for("example.com");
//! println!("topology: {:?}, hosts: {:?}", cache.topology, cache.hosts);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Name of the backend shared by every domain without its own cache section
pub const GLOBAL_BACKEND: &str = "global";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyCacheConfig {
    /// Deployment environment (development, test, production)
    pub environment: String,

    /// Console logging settings
    pub logging: LoggingConfig,

    /// Global cache backend settings
    pub cache: CacheConfig,

    /// Default circuit breaker settings for every backend
    pub circuit_breaker: CircuitBreakerComponentConfig,

    /// Distributed mutex settings
    pub mutex: MutexConfig,

    /// Per-domain overrides, keyed by backend name
    pub domains: HashMap<String, DomainConfig>,
}

impl Default for ProxyCacheConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
            circuit_breaker: CircuitBreakerComponentConfig::default(),
            mutex: MutexConfig::default(),
            domains: HashMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set; empty picks one per environment
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::new(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Deployment shape of a cache backend, fixed when the handle is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTopology {
    /// One Redis node
    #[default]
    Single,
    /// Redis cluster; `hosts` lists the primaries
    Cluster,
    /// In-process store, sharded when `shards > 1`
    Memory,
}

/// Cache backend settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub topology: CacheTopology,

    /// `host:port` entries or `redis://` URLs
    pub hosts: Vec<String>,

    pub password: Option<String>,

    /// Database index for single-node deployments
    pub db: i64,

    /// TTL used when a response carries no caching headers; zero disables caching
    pub default_ttl_seconds: u64,

    /// Response status codes eligible for caching
    pub allowed_statuses: Vec<u16>,

    /// Request methods eligible for caching
    pub allowed_methods: Vec<String>,

    pub connection_timeout_ms: u64,

    pub response_timeout_ms: u64,

    /// Number of in-process shards for the memory topology
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            topology: CacheTopology::Single,
            hosts: vec!["127.0.0.1:6379".to_string()],
            password: None,
            db: 0,
            default_ttl_seconds: 0,
            allowed_statuses: vec![200, 301, 302],
            allowed_methods: vec!["HEAD".to_string(), "GET".to_string()],
            connection_timeout_ms: 5000,
            response_timeout_ms: 2000,
            shards: 1,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn is_status_allowed(&self, status: u16) -> bool {
        self.allowed_statuses.contains(&status)
    }

    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(method))
    }

    /// Apply a domain override, keeping every field the override leaves unset
    pub fn merged_with(&self, overrides: &CacheOverride) -> CacheConfig {
        CacheConfig {
            topology: overrides.topology.unwrap_or(self.topology),
            hosts: overrides
                .hosts
                .clone()
                .filter(|hosts| !hosts.is_empty())
                .unwrap_or_else(|| self.hosts.clone()),
            password: overrides.password.clone().or_else(|| self.password.clone()),
            db: overrides.db.unwrap_or(self.db),
            default_ttl_seconds: overrides
                .default_ttl_seconds
                .unwrap_or(self.default_ttl_seconds),
            allowed_statuses: overrides
                .allowed_statuses
                .clone()
                .unwrap_or_else(|| self.allowed_statuses.clone()),
            allowed_methods: overrides
                .allowed_methods
                .clone()
                .unwrap_or_else(|| self.allowed_methods.clone()),
            connection_timeout_ms: overrides
                .connection_timeout_ms
                .unwrap_or(self.connection_timeout_ms),
            response_timeout_ms: overrides
                .response_timeout_ms
                .unwrap_or(self.response_timeout_ms),
            shards: overrides.shards.unwrap_or(self.shards),
        }
    }

    fn validate(&self, section: &str) -> ConfigResult<()> {
        if self.topology != CacheTopology::Memory && self.hosts.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                format!("{section}.hosts"),
                "redis topologies need at least one host",
            ));
        }

        if self.topology == CacheTopology::Memory && self.shards == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("{section}.shards"),
                "0",
                "memory topology needs at least one shard",
            ));
        }

        if let Some(status) = self
            .allowed_statuses
            .iter()
            .find(|status| !(100..=599).contains(*status))
        {
            return Err(ConfigurationError::invalid_value(
                format!("{section}.allowed_statuses"),
                status.to_string(),
                "status codes must be between 100 and 599",
            ));
        }

        if self.connection_timeout_ms == 0 || self.response_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("{section}.connection_timeout_ms/response_timeout_ms"),
                "0",
                "timeouts must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Field-level cache overrides for one domain
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheOverride {
    pub topology: Option<CacheTopology>,
    pub hosts: Option<Vec<String>>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub default_ttl_seconds: Option<u64>,
    pub allowed_statuses: Option<Vec<u16>>,
    pub allowed_methods: Option<Vec<String>>,
    pub connection_timeout_ms: Option<u64>,
    pub response_timeout_ms: Option<u64>,
    pub shards: Option<usize>,
}

/// Overrides for one named backend
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DomainConfig {
    pub cache: Option<CacheOverride>,
    pub circuit_breaker: Option<CircuitBreakerComponentConfig>,
}

/// Circuit breaker settings for one component
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    /// Minimum requests in the current window before the breaker may trip
    pub threshold: u32,

    /// Failure ratio (0, 1] that trips the breaker
    pub failure_rate: f64,

    /// Closed-state count reset interval in seconds; zero never resets
    pub interval_seconds: u64,

    /// Time spent open before probing, in seconds
    pub timeout_seconds: u64,

    /// Probe calls admitted while half-open
    pub max_requests: u32,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            threshold: 2,
            failure_rate: 0.5,
            interval_seconds: 0,
            timeout_seconds: 60,
            max_requests: 1,
        }
    }
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::config::CircuitBreakerConfig {
        crate::resilience::config::CircuitBreakerConfig {
            threshold: self.threshold,
            failure_rate: self.failure_rate,
            interval: Duration::from_secs(self.interval_seconds),
            timeout: Duration::from_secs(self.timeout_seconds),
            max_requests: self.max_requests,
        }
    }
}

/// Circuit breaker settings resolved for every known component
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerConfig {
    /// Configuration for components without their own entry
    pub default_config: CircuitBreakerComponentConfig,

    /// Specific configurations for named components
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl CircuitBreakerConfig {
    /// Get configuration for a specific component
    ///
    /// Shard breakers (`<backend>#shard-<n>`) share their backend's entry.
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        let backend = component_name
            .split_once(SHARD_SUFFIX)
            .map_or(component_name, |(backend, _)| backend);
        self.component_configs
            .get(backend)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }
}

/// Separator between a backend name and its shard index in breaker names
pub const SHARD_SUFFIX: &str = "#shard-";

/// Distributed mutex settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MutexConfig {
    /// Lifetime of a lock record
    pub expiry_ms: u64,

    /// Extra acquisition attempts after the first
    pub retry_count: u32,

    /// Fixed delay between attempts
    pub retry_delay_ms: u64,

    /// Maximum mutex objects cached per backend
    pub registry_capacity: u64,

    /// Idle time after which a cached mutex object is dropped
    pub registry_idle_seconds: u64,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            expiry_ms: 8000,
            retry_count: 32,
            retry_delay_ms: 50,
            registry_capacity: 10_000,
            registry_idle_seconds: 300,
        }
    }
}

impl ProxyCacheConfig {
    /// Cache settings of a backend: the domain override merged over the global section
    pub fn cache_for(&self, backend: &str) -> CacheConfig {
        match self.domains.get(backend).and_then(|d| d.cache.as_ref()) {
            Some(overrides) => self.cache.merged_with(overrides),
            None => self.cache.clone(),
        }
    }

    /// Names of every backend to build: the global one, then domains with a cache section
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .domains
            .iter()
            .filter(|(name, domain)| domain.cache.is_some() && name.as_str() != GLOBAL_BACKEND)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names.insert(0, GLOBAL_BACKEND.to_string());
        names
    }

    /// Circuit breaker settings for the breaker manager
    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            default_config: self.circuit_breaker.clone(),
            component_configs: self
                .domains
                .iter()
                .filter_map(|(name, domain)| {
                    domain
                        .circuit_breaker
                        .clone()
                        .map(|config| (name.clone(), config))
                })
                .collect(),
        }
    }

    /// Check the merged configuration for values the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.environment.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "environment",
                "root configuration",
            ));
        }

        if !self.logging.level.is_empty()
            && self.logging.level.parse::<tracing::Level>().is_err()
        {
            return Err(ConfigurationError::invalid_value(
                "logging.level",
                self.logging.level.clone(),
                "expected one of trace, debug, info, warn, error",
            ));
        }

        self.cache.validate("cache")?;
        self.circuit_breaker
            .to_resilience_config()
            .validate()
            .map_err(|reason| {
                ConfigurationError::invalid_value("circuit_breaker", "", reason)
            })?;

        for (name, domain) in &self.domains {
            if let Some(overrides) = &domain.cache {
                self.cache
                    .merged_with(overrides)
                    .validate(&format!("domains.{name}.cache"))?;
            }
            if let Some(breaker) = &domain.circuit_breaker {
                breaker.to_resilience_config().validate().map_err(|reason| {
                    ConfigurationError::invalid_value(
                        format!("domains.{name}.circuit_breaker"),
                        "",
                        reason,
                    )
                })?;
            }
        }

        if self.mutex.expiry_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "mutex.expiry_ms",
                "0",
                "lock records need a positive expiry",
            ));
        }

        if self.mutex.registry_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "mutex.registry_capacity",
                "0",
                "the mutex registry needs room for at least one entry",
            ));
        }

        Ok(())
    }
}
