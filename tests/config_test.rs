//! Loading the shipped configuration and building backends from it

mod common;

use common::init_test_logging;
use proxy_cache::cache::{BackendRegistry, TopologyKind};
use proxy_cache::config::{CacheTopology, ConfigManager, ConfigurationError, LogFormat};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SAMPLE_CONFIG: &str = "config/proxy-cache.toml";

fn load_sample(
    overrides: HashMap<String, String>,
) -> Result<Arc<ConfigManager>, ConfigurationError> {
    ConfigManager::load_with_overrides(Some(Path::new(SAMPLE_CONFIG)), overrides)
}

#[test]
fn test_sample_config_loads() -> Result<(), Box<dyn std::error::Error>> {
    let manager = load_sample(HashMap::new())?;
    let config = manager.config();

    assert_eq!(config.environment, "development");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.cache.topology, CacheTopology::Memory);
    assert_eq!(config.backend_names(), vec!["global", "shop.example.com"]);

    let shop = config.cache_for("shop.example.com");
    assert_eq!(shop.shards, 3);
    assert_eq!(shop.default_ttl(), Duration::from_secs(30));
    assert_eq!(shop.allowed_methods, config.cache.allowed_methods);

    let breakers = config.circuit_breaker_config();
    assert_eq!(breakers.config_for_component("shop.example.com#shard-2").threshold, 5);
    assert_eq!(breakers.config_for_component("global").threshold, 2);
    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<(), Box<dyn std::error::Error>> {
    let overrides = HashMap::from([
        ("PROXY_CACHE__ENVIRONMENT".to_string(), "production".to_string()),
        ("PROXY_CACHE__CACHE__SHARDS".to_string(), "4".to_string()),
        (
            "PROXY_CACHE__CACHE__ALLOWED_METHODS".to_string(),
            "GET,HEAD,OPTIONS".to_string(),
        ),
        ("PROXY_CACHE__MUTEX__RETRY_COUNT".to_string(), "3".to_string()),
    ]);
    let manager = load_sample(overrides)?;
    let config = manager.config();

    assert_eq!(config.environment, "production");
    assert_eq!(config.cache.shards, 4);
    assert!(config.cache.is_method_allowed("options"));
    assert_eq!(config.mutex.retry_count, 3);
    // File values that were not overridden survive
    assert_eq!(config.cache.allowed_statuses, vec![200, 301, 302]);
    Ok(())
}

#[test]
fn test_invalid_override_is_a_configuration_error() {
    let overrides = HashMap::from([(
        "PROXY_CACHE__CIRCUIT_BREAKER__FAILURE_RATE".to_string(),
        "1.5".to_string(),
    )]);
    let result = load_sample(overrides);
    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn test_registry_from_sample_config() -> Result<(), Box<dyn std::error::Error>> {
    init_test_logging();

    let manager = load_sample(HashMap::new())?;
    let registry = BackendRegistry::connect_all(manager.config()).await?;

    let global = registry.get("global")?;
    assert_eq!(global.topology().kind(), TopologyKind::Single);
    let shop = registry.get("shop.example.com")?;
    assert_eq!(shop.topology().kind(), TopologyKind::Sharded);
    assert_eq!(shop.topology().shard_count(), 3);
    assert_eq!(shop.breaker().config().threshold, 5);

    assert!(global.ping().await);
    assert!(shop.ping().await);

    registry.close_all().await;
    assert!(!shop.ping().await);
    Ok(())
}
