//! Distributed mutex on top of the backing store
//!
//! A lock is an owner record written with set-if-absent and an expiry; the
//! record holds a random token and is released by compare-and-delete on that
//! token. Expiry bounds how long a crashed owner can block a key.
//!
//! Each backend handle owns a `MutexRegistry`: a bounded cache of mutex
//! objects per key, evicted by size and idle time.

use super::errors::{CacheError, CacheResult};
use super::keys::mutex_key;
use super::traits::KeyValueStore;
use crate::config::MutexConfig;
use moka::sync::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lock acquisition settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexOptions {
    /// Lifetime of the owner record
    pub expiry: Duration,
    /// Extra attempts after the first one fails
    pub retry_count: u32,
    /// Fixed pause between attempts
    pub retry_delay: Duration,
}

impl Default for MutexOptions {
    fn default() -> Self {
        Self::from(&MutexConfig::default())
    }
}

impl From<&MutexConfig> for MutexOptions {
    fn from(config: &MutexConfig) -> Self {
        Self {
            expiry: Duration::from_millis(config.expiry_ms),
            retry_count: config.retry_count,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Proof of ownership returned by `lock`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    record_key: String,
    token: String,
}

impl LockLease {
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Advisory lock for one key
#[derive(Debug, Clone)]
pub struct DistributedMutex {
    key: String,
    record_key: String,
    options: MutexOptions,
}

impl DistributedMutex {
    pub fn new(key: impl Into<String>, options: MutexOptions) -> Self {
        let key = key.into();
        Self {
            record_key: mutex_key(&key),
            key,
            options,
        }
    }

    /// Key this mutex guards
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key of the owner record in the store
    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    /// Acquire the lock, retrying with a fixed delay while another owner holds it
    pub async fn lock<S: KeyValueStore>(&self, store: &S) -> CacheResult<LockLease> {
        let token = Uuid::new_v4().to_string();
        let attempts = self.options.retry_count.saturating_add(1);

        for attempt in 1..=attempts {
            if store
                .set_if_absent(&self.record_key, &token, self.options.expiry)
                .await?
            {
                debug!(key = %self.key, attempt, "Mutex acquired");
                return Ok(LockLease {
                    record_key: self.record_key.clone(),
                    token,
                });
            }
            if attempt < attempts {
                tokio::time::sleep(self.options.retry_delay).await;
            }
        }

        Err(CacheError::Lock {
            key: self.key.clone(),
            reason: format!("still held by another owner after {} attempts", attempts),
        })
    }

    /// Release the lock if the record still carries the lease token
    pub async fn unlock<S: KeyValueStore>(&self, store: &S, lease: LockLease) -> CacheResult<()> {
        if store
            .delete_if_equals(&lease.record_key, &lease.token)
            .await?
        {
            debug!(key = %self.key, "Mutex released");
            Ok(())
        } else {
            warn!(key = %self.key, "Mutex record expired or taken over before release");
            Err(CacheError::Unlock {
                key: self.key.clone(),
                reason: "lock no longer owned by this holder".to_string(),
            })
        }
    }

    /// Run `operation` while holding the lock
    ///
    /// A failed release is reported only when the operation itself succeeded.
    pub async fn run_locked<S, T, F, Fut>(&self, store: &S, operation: F) -> CacheResult<T>
    where
        S: KeyValueStore,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let lease = self.lock(store).await?;
        let result = operation().await;
        let released = self.unlock(store, lease).await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(unlock_err)) => Err(unlock_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(unlock_err)) => {
                warn!(key = %self.key, error = %unlock_err, "Release failed after operation error");
                Err(err)
            }
        }
    }
}

/// Bounded per-handle cache of mutex objects
#[derive(Clone)]
pub struct MutexRegistry {
    backend: String,
    options: MutexOptions,
    mutexes: Cache<String, Arc<DistributedMutex>>,
}

impl std::fmt::Debug for MutexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexRegistry")
            .field("backend", &self.backend)
            .field("options", &self.options)
            .field("entries", &self.mutexes.entry_count())
            .finish()
    }
}

impl MutexRegistry {
    pub fn new(backend: impl Into<String>, config: &MutexConfig) -> Self {
        let mutexes = Cache::builder()
            .max_capacity(config.registry_capacity)
            .time_to_idle(Duration::from_secs(config.registry_idle_seconds))
            .build();

        Self {
            backend: backend.into(),
            options: MutexOptions::from(config),
            mutexes,
        }
    }

    /// Mutex for `key`, created on first use
    pub fn get(&self, key: &str) -> Arc<DistributedMutex> {
        self.mutexes.get_with(key.to_string(), || {
            Arc::new(DistributedMutex::new(key, self.options))
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn options(&self) -> MutexOptions {
        self.options
    }

    /// Approximate number of cached mutex objects
    pub fn len(&self) -> u64 {
        self.mutexes.run_pending_tasks();
        self.mutexes.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
