//! Wildcard delete fan-out across memory shards

mod common;

use common::*;
use proxy_cache::cache::{BackendClient, CacheError, KeyValueStore, TopologyKind};
use proxy_cache::cache::keys::mutex_key;
use proxy_cache::resilience::CircuitState;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tracing::info;

/// Put `per_shard` keys matching `DATA@@/page*`, plus one `/other` key, on every shard
async fn seed_shards(client: &BackendClient, per_shard: usize) {
    let router = memory_router(client);
    for (index, store) in router.shards().iter().enumerate() {
        let mut keys = keys_owned_by(&router, index, "DATA@@/page@@", per_shard);
        keys.extend(keys_owned_by(&router, index, "DATA@@/other@@", 1));
        for key in keys {
            store.set(&key, "v", Duration::ZERO).await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_fan_out_deletes_on_every_shard() {
    init_test_logging();

    let (client, _breakers) = memory_backend("global", 3).await;
    assert_eq!(client.topology().kind(), TopologyKind::Sharded);
    let stores = shard_stores(&client);
    seed_shards(&client, 2).await;

    let outcome = client.delete_wildcard("DATA@@/page*").await;
    assert_eq!(outcome.deleted, 6);
    assert_eq!(outcome.failed_shards, 0);
    assert!(outcome.is_complete());

    for store in &stores {
        assert_eq!(store.keys("*").await.unwrap().len(), 1, "only /other is left");
        assert!(store.keys("mutex-*").await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_fan_out_partial_failure_on_one_shard() {
    init_test_logging();
    info!("🧪 Shard 2 of 3 is down during a wildcard delete");

    let (client, breakers) = memory_backend("global", 3).await;
    let stores = shard_stores(&client);
    seed_shards(&client, 2).await;
    stores[2].set_available(false);

    let outcome = client.delete_wildcard("DATA@@/page*").await;

    assert_eq!(outcome.deleted, 4, "shards 0 and 1 are still purged");
    assert_eq!(outcome.failed_shards, 1);
    assert_eq!(
        outcome.first_error,
        Some(CacheError::Backend(
            "memory store 'global#shard-2' unavailable".to_string()
        ))
    );
    assert!(stores[0].keys("DATA@@/page*").await.unwrap().is_empty());
    assert!(stores[1].keys("DATA@@/page*").await.unwrap().is_empty());

    // The failure is charged to the shard breaker only
    let shard_metrics = breakers
        .get_component_metrics("global#shard-2")
        .await
        .unwrap();
    assert_eq!(shard_metrics.failure_count, 1);
    let healthy_shard = breakers
        .get_component_metrics("global#shard-0")
        .await
        .unwrap();
    assert_eq!(healthy_shard.failure_count, 0);
    assert_eq!(client.circuit_state(), CircuitState::Closed);
    assert_eq!(client.breaker().counts().total_failures, 0);

    stores[2].set_available(true);
    let retry = client.delete_wildcard("DATA@@/page*").await;
    assert_eq!(retry.into_result(), Ok(2));
}

#[tokio::test]
async fn test_open_shard_breaker_short_circuits_that_shard() {
    let (client, _breakers) = memory_backend("global", 3).await;
    let stores = shard_stores(&client);
    seed_shards(&client, 1).await;

    let shard = &client.topology().shards()[1];
    shard.breaker().force_open();

    let outcome = client.delete_wildcard("DATA@@/page*").await;
    assert_eq!(outcome.deleted, 2);
    assert_eq!(
        outcome.first_error,
        Some(CacheError::BreakerOpen {
            backend: "global#shard-1".to_string()
        })
    );
    assert_eq!(stores[1].keys("DATA@@/page*").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_zero_matches_is_not_an_error() {
    let (client, _breakers) = memory_backend("global", 3).await;
    seed_shards(&client, 1).await;

    let outcome = client.delete_wildcard("DATA@@/nothing*").await;
    assert_eq!(outcome.into_result(), Ok(0));
}

#[tokio::test]
async fn test_first_error_follows_shard_order() {
    let (client, _breakers) = memory_backend("global", 3).await;
    let stores = shard_stores(&client);
    stores[1].set_available(false);
    stores[2].set_available(false);

    let outcome = client.delete_wildcard("*").await;
    assert_eq!(outcome.failed_shards, 2);
    assert_eq!(
        outcome.into_result(),
        Err(CacheError::Backend(
            "memory store 'global#shard-1' unavailable".to_string()
        ))
    );
}

#[tokio::test]
async fn test_purge_all_flushes_every_shard() {
    let (client, _breakers) = memory_backend("global", 3).await;
    let stores = shard_stores(&client);
    seed_shards(&client, 3).await;

    assert_ok!(client.purge_all().await);
    assert!(stores.iter().all(|store| store.is_empty()));

    stores[0].set_available(false);
    let err = assert_err!(client.purge_all().await);
    assert!(matches!(err, CacheError::Backend(_)));
}

#[tokio::test]
async fn test_match_all_leaves_live_lock_records() {
    init_test_logging();

    let (client, _breakers) = memory_backend("global", 3).await;
    let stores = shard_stores(&client);
    seed_shards(&client, 2).await;

    // Another writer is mid-mutation on a key
    let writer = client.mutexes().get("DATA@@/busy");
    let lease = writer.lock(client.topology()).await.unwrap();

    let outcome = client.delete_wildcard("*").await;
    assert_eq!(outcome.into_result(), Ok(9));

    let mut left = Vec::new();
    for store in &stores {
        left.extend(store.keys("*").await.unwrap());
    }
    assert_eq!(left, vec![writer.record_key().to_string()]);
    assert_ok!(writer.unlock(client.topology(), lease).await);
}

#[tokio::test]
async fn test_match_all_on_single_node() {
    let (client, _breakers) = memory_backend("global", 1).await;
    let store = single_store(&client);
    for key in ["DATA@@/a", "DATA@@/b", "META@@/a"] {
        store.set(key, "v", Duration::ZERO).await.unwrap();
    }

    let outcome = client.delete_wildcard("*").await;
    assert_eq!(outcome.into_result(), Ok(3));
    assert!(store.is_empty());
    assert_eq!(client.breaker().counts().total_failures, 0);
}

#[tokio::test]
async fn test_tagged_keys_lock_on_their_own_shard() {
    let (client, _breakers) = memory_backend("global", 3).await;
    let router = memory_router(&client);
    let key = "DATA@@/feed?{user1}@@en";
    client.set(key, "v", Duration::ZERO).await.unwrap();

    let owner = router.shard_for(key).label().to_string();
    let lock_shard = router.shard_for(&mutex_key(key)).label().to_string();
    assert_eq!(owner, lock_shard);

    // Every other shard is down; the delete only needs the owner
    for store in router.shards().iter().filter(|store| store.label() != owner) {
        store.set_available(false);
    }
    let outcome = client.delete_wildcard("DATA@@/feed*").await;
    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.failed_shards, 2);
    assert!(router.shard_for(key).is_empty());
}
