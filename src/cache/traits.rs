//! Key/value store trait definition

use super::errors::CacheResult;
use std::future::Future;
use std::time::Duration;

/// Operations the cache engine needs from one backing-store connection
///
/// Implemented by concrete store providers (Redis node, Redis cluster,
/// in-process memory). All operations are async and return `CacheResult`.
/// A `ttl` of zero always means "no expiry".
pub trait KeyValueStore: Send + Sync {
    /// Get a string value by key
    ///
    /// Returns `Ok(Some(value))` when present, `Ok(None)` when absent.
    fn get(&self, key: &str) -> impl Future<Output = CacheResult<Option<String>>> + Send;

    /// Set a string value, replacing any previous value
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Set a value only if the key does not exist yet
    ///
    /// Returns `Ok(true)` when the value was written.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<bool>> + Send;

    /// Delete the given keys, returning how many existed
    fn delete(&self, keys: &[String]) -> impl Future<Output = CacheResult<u64>> + Send;

    /// Delete a key only if it currently holds `expected`
    fn delete_if_equals(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = CacheResult<bool>> + Send;

    /// List keys matching a glob-style pattern (`*`, `?`, `\` escapes)
    fn keys(&self, pattern: &str) -> impl Future<Output = CacheResult<Vec<String>>> + Send;

    /// Read a whole list, in insertion order
    fn list(&self, key: &str) -> impl Future<Output = CacheResult<Vec<String>>> + Send;

    /// Append values to a list, creating it when missing
    fn push(&self, key: &str, values: &[String]) -> impl Future<Output = CacheResult<()>> + Send;

    /// Set or refresh the TTL of an existing key
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = CacheResult<()>> + Send;

    /// Remove every key of the selected database
    fn flush(&self) -> impl Future<Output = CacheResult<()>> + Send;

    /// Liveness probe
    fn ping(&self) -> impl Future<Output = CacheResult<()>> + Send;

    /// Name of the store provider, for logs
    fn provider_name(&self) -> &'static str;
}
