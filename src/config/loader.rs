//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered with the
//! `config` crate, lowest precedence first:
//!
//! 1. built-in defaults (`ProxyCacheConfig::default()`)
//! 2. a TOML or YAML file (format picked from the extension)
//! 3. `PROXY_CACHE__*` environment variables, `__` separating nested keys,
//!    e.g. `PROXY_CACHE__CACHE__TOPOLOGY=cluster`
//!
//! List-valued settings (`cache.hosts`, `cache.allowed_methods`,
//! `cache.allowed_statuses`) accept comma-separated environment values.

use super::error::{ConfigResult, ConfigurationError};
use super::ProxyCacheConfig;
use ::config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "PROXY_CACHE";

/// Environment variable naming the configuration file
pub const CONFIG_PATH_VAR: &str = "PROXY_CACHE_CONFIG";

/// File used when `PROXY_CACHE_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/proxy-cache.toml";

const LIST_KEYS: [&str; 3] = [
    "cache.hosts",
    "cache.allowed_methods",
    "cache.allowed_statuses",
];

/// Loaded, validated configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ProxyCacheConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from the default locations and the process environment
    ///
    /// A missing default file is not an error; defaults and environment
    /// variables still apply.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load_from_file(path),
            Err(_) => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
                let path = default_path.is_file().then_some(default_path);
                Self::build(path, None)
            }
        }
    }

    /// Load configuration from a specific file plus the process environment
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound { path });
        }
        Self::build(Some(path), None)
    }

    /// Load configuration with an explicit set of environment overrides
    ///
    /// Keys use the same names as real environment variables
    /// (`PROXY_CACHE__CACHE__TOPOLOGY`). The process environment is not read,
    /// which keeps tests independent of each other.
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: HashMap<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                });
            }
        }
        Self::build(path.map(Path::to_path_buf), Some(overrides))
    }

    fn build(
        path: Option<PathBuf>,
        env_source: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let defaults = Config::try_from(&ProxyCacheConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = &path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.as_path()));
        }

        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }
        if env_source.is_some() {
            environment = environment.source(env_source);
        }
        builder = builder.add_source(environment);

        let source_name = path
            .as_ref()
            .map_or_else(|| "environment".to_string(), |p| p.display().to_string());
        let merged = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;
        let config: ProxyCacheConfig = merged.try_deserialize()?;

        config.validate()?;

        // Use sanitized configuration for logging to avoid exposing credentials
        debug!(
            "Configuration loaded: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %config.environment,
            topology = ?config.cache.topology,
            domains = config.domains.len(),
            "⚙️ Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            config_path: path,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ProxyCacheConfig {
        &self.config
    }

    /// Deployment environment of the loaded configuration
    pub fn environment(&self) -> &str {
        &self.config.environment
    }

    /// File the configuration was read from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Configuration as JSON with credentials masked, for debugging
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Sanitize configuration for safe logging by masking sensitive fields
    fn sanitize_config_for_logging(config: &ProxyCacheConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "credential", "auth"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    /// Recursively sanitize sensitive fields in JSON configuration
    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = match val {
                            serde_json::Value::Null => serde_json::Value::Null,
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheTopology, LogFormat};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_sources() {
        let manager = ConfigManager::load_with_overrides(None, HashMap::new()).unwrap();
        assert_eq!(manager.environment(), "development");
        assert_eq!(manager.config().cache.topology, CacheTopology::Single);
        assert!(manager.config_path().is_none());
    }

    #[test]
    fn test_file_and_env_layering() {
        let file = write_config(
            r#"
environment = "production"

[logging]
format = "json"

[cache]
topology = "cluster"
hosts = ["10.0.0.1:6379", "10.0.0.2:6379"]
default_ttl_seconds = 60

[domains."example.com".circuit_breaker]
threshold = 5
failure_rate = 0.25
timeout_seconds = 10
"#,
        );

        let overrides = HashMap::from([
            (
                "PROXY_CACHE__CACHE__DEFAULT_TTL_SECONDS".to_string(),
                "90".to_string(),
            ),
            (
                "PROXY_CACHE__CACHE__ALLOWED_METHODS".to_string(),
                "GET,HEAD,OPTIONS".to_string(),
            ),
        ]);
        let manager = ConfigManager::load_with_overrides(Some(file.path()), overrides).unwrap();
        let config = manager.config();

        assert_eq!(config.environment, "production");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.cache.topology, CacheTopology::Cluster);
        assert_eq!(config.cache.hosts.len(), 2);
        assert_eq!(config.cache.default_ttl_seconds, 90);
        assert_eq!(config.cache.allowed_methods, vec!["GET", "HEAD", "OPTIONS"]);
        // Untouched fields keep their defaults
        assert_eq!(config.cache.allowed_statuses, vec![200, 301, 302]);

        let breaker = config
            .circuit_breaker_config()
            .config_for_component("example.com");
        assert_eq!(breaker.threshold, 5);
        assert_eq!(breaker.max_requests, 1);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ConfigManager::load_from_file("/nonexistent/proxy-cache.toml").unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = write_config(
            r#"
[circuit_breaker]
failure_rate = 0.0
"#,
        );
        let err = ConfigManager::load_with_overrides(Some(file.path()), HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_debug_config_masks_password() {
        let overrides = HashMap::from([(
            "PROXY_CACHE__CACHE__PASSWORD".to_string(),
            "hunter2".to_string(),
        )]);
        let manager = ConfigManager::load_with_overrides(None, overrides).unwrap();
        assert_eq!(manager.config().cache.password.as_deref(), Some("hunter2"));

        let debug = manager.debug_config();
        assert_eq!(debug["cache"]["password"], "[MASKED]");
        assert_eq!(debug["cache"]["db"], 0);
    }
}
