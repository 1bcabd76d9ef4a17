//! Circuit breaker behaviour through configured backends

mod common;

use common::*;
use proxy_cache::cache::{BackendRegistry, CacheError, Headers};
use proxy_cache::config::{
    CacheOverride, CacheTopology, CircuitBreakerComponentConfig, DomainConfig, ProxyCacheConfig,
};
use proxy_cache::resilience::{CircuitBreakerError, CircuitState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

const DOMAIN: &str = "api.example.com";

fn config_with_fast_recovery() -> ProxyCacheConfig {
    let mut config = ProxyCacheConfig::default();
    config.cache.topology = CacheTopology::Memory;
    config.domains.insert(
        DOMAIN.to_string(),
        DomainConfig {
            cache: Some(CacheOverride::default()),
            circuit_breaker: Some(CircuitBreakerComponentConfig {
                threshold: 2,
                failure_rate: 0.5,
                interval_seconds: 0,
                timeout_seconds: 1,
                max_requests: 1,
            }),
        },
    );
    config
}

#[tokio::test]
async fn test_trip_fail_fast_and_recover() -> Result<(), Box<dyn std::error::Error>> {
    init_test_logging();
    info!("🧪 Breaker lifecycle on a domain backend");

    let registry = BackendRegistry::connect_all(&config_with_fast_recovery()).await?;
    let client = registry.get(DOMAIN)?;
    let store = single_store(&client);
    let mut transitions = client.breaker().subscribe();

    store.set_available(false);
    assert!(matches!(client.get("k").await, Err(CacheError::Backend(_))));
    assert_eq!(client.circuit_state(), CircuitState::Closed);
    assert!(matches!(client.get("k").await, Err(CacheError::Backend(_))));
    assert_eq!(client.circuit_state(), CircuitState::Open);

    let opened = transitions.recv().await?;
    assert_eq!(opened.name, DOMAIN);
    assert_eq!((opened.from, opened.to), (CircuitState::Closed, CircuitState::Open));

    // Open: operations are rejected without running
    let invoked = AtomicUsize::new(0);
    let rejected = client
        .breaker()
        .call(|| async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok::<(), CacheError>(())
        })
        .await;
    assert!(matches!(
        rejected,
        Err(CircuitBreakerError::CircuitOpen { .. })
    ));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert!(client.get("k").await.unwrap_err().is_short_circuit());
    assert!(client.breaker().metrics().rejected_count >= 2);

    // The global backend is unaffected
    let global = registry.get("global")?;
    assert!(global.ping().await);

    store.set_available(true);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(client.circuit_state(), CircuitState::HalfOpen);

    // One successful probe closes the breaker
    assert_eq!(client.get("k").await?, None);
    assert_eq!(client.circuit_state(), CircuitState::Closed);

    let half_open = transitions.recv().await?;
    let closed = transitions.recv().await?;
    assert_eq!(half_open.to, CircuitState::HalfOpen);
    assert_eq!(closed.to, CircuitState::Closed);

    Ok(())
}

#[tokio::test]
async fn test_failed_probe_reopens() -> Result<(), Box<dyn std::error::Error>> {
    let registry = BackendRegistry::connect_all(&config_with_fast_recovery()).await?;
    let client = registry.get(DOMAIN)?;
    let store = single_store(&client);

    store.set_available(false);
    let _ = client.get("k").await;
    let _ = client.get("k").await;
    assert_eq!(client.circuit_state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(client.circuit_state(), CircuitState::HalfOpen);

    assert!(matches!(client.get("k").await, Err(CacheError::Backend(_))));
    assert_eq!(client.circuit_state(), CircuitState::Open);
    Ok(())
}

#[tokio::test]
async fn test_open_breaker_turns_page_cache_into_misses() -> Result<(), Box<dyn std::error::Error>>
{
    let registry = BackendRegistry::connect_all(&config_with_fast_recovery()).await?;
    let pages = registry.page_cache(DOMAIN)?;
    let response = cacheable_response(None);

    assert!(
        pages
            .store_full_page("GET", "/", 200, &response, &Headers::new(), b"ok", None)
            .await?
    );

    pages.client().breaker().force_open();
    let store_err = pages
        .store_full_page("GET", "/", 200, &response, &Headers::new(), b"ok", None)
        .await
        .unwrap_err();
    assert!(store_err.is_short_circuit());
    let read_err = pages
        .retrieve_full_page("GET", "/", &Headers::new())
        .await
        .unwrap_err();
    assert!(read_err.is_short_circuit());

    // The entry is still there once the operator closes the breaker
    pages.client().breaker().force_closed();
    let entry = pages.retrieve_full_page("GET", "/", &Headers::new()).await?;
    assert_eq!(entry.map(|e| e.body), Some(b"ok".to_vec()));
    Ok(())
}

#[tokio::test]
async fn test_manager_reports_system_health() -> Result<(), Box<dyn std::error::Error>> {
    let registry = BackendRegistry::connect_all(&config_with_fast_recovery()).await?;
    let breakers = registry.breakers();
    assert_eq!(breakers.system_health_score().await, 1.0);

    registry.get(DOMAIN)?.breaker().force_open();
    let system = breakers.get_system_metrics().await;
    assert_eq!(system.unhealthy_circuits(), vec![DOMAIN]);
    assert_eq!(breakers.system_health_score().await, 0.5);

    let domain_config = breakers.get_circuit_breaker(DOMAIN).await.config().clone();
    assert_eq!(domain_config.timeout, Duration::from_secs(1));
    let global_config = breakers.get_circuit_breaker("global").await.config().clone();
    assert_eq!(global_config.timeout, Duration::from_secs(60));
    Ok(())
}
