//! In-process key/value store
//!
//! A `DashMap`-backed store with per-key expiry, list values and Redis-style
//! glob matching. It is used for local development (`topology = "memory"`)
//! and as the backing store in tests. `ShardedMemoryStore` routes keys across
//! several `MemoryStore`s the way a cluster routes slots, including `{tag}`
//! hash tags, so the sharded code paths can be exercised without a cluster.
//!
//! **Important**: this store is NOT distributed. Each process has its own
//! state, so the distributed mutex only serializes tasks of one process.

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::keys::hash_tag;
use crate::cache::traits::KeyValueStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
enum StoredData {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: StoredData,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: StoredData, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: deadline(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

fn deadline(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Some(Instant::now() + ttl)
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Backend(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

#[derive(Debug)]
struct MemoryInner {
    label: String,
    entries: DashMap<String, StoredValue>,
    available: AtomicBool,
}

/// In-process store; clones share the same data
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryStore {
    /// Create an empty store; `label` identifies it in logs and errors
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                label: label.into(),
                entries: DashMap::new(),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Label given at construction
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Simulate an outage: while unavailable every operation fails
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
        debug!(store = %self.inner.label, available, "Memory store availability changed");
    }

    /// Number of live (non-expired) keys
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> CacheResult<()> {
        if self.inner.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::Backend(format!(
                "memory store '{}' unavailable",
                self.inner.label
            )))
        }
    }

    /// Fetch a live value, dropping it if it already expired
    fn live(&self, key: &str) -> Option<StoredValue> {
        let value = self.inner.entries.get(key)?.value().clone();
        if value.is_expired() {
            self.inner.entries.remove_if(key, |_, v| v.is_expired());
            None
        } else {
            Some(value)
        }
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.ensure_available()?;
        match self.live(key).map(|v| v.data) {
            None => Ok(None),
            Some(StoredData::Text(text)) => Ok(Some(text)),
            Some(StoredData::List(_)) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.ensure_available()?;
        self.inner.entries.insert(
            key.to_string(),
            StoredValue::new(StoredData::Text(value.to_string()), ttl),
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        self.ensure_available()?;
        let stored = StoredValue::new(StoredData::Text(value.to_string()), ttl);
        match self.inner.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(stored);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(true)
            }
        }
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        self.ensure_available()?;
        let mut removed = 0;
        for key in keys {
            if let Some((_, value)) = self.inner.entries.remove(key) {
                if !value.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> CacheResult<bool> {
        self.ensure_available()?;
        let removed = self.inner.entries.remove_if(key, |_, value| {
            !value.is_expired() && matches!(&value.data, StoredData::Text(text) if text == expected)
        });
        Ok(removed.is_some())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.ensure_available()?;
        Ok(self
            .inner
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired() && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        self.ensure_available()?;
        match self.live(key).map(|v| v.data) {
            None => Ok(Vec::new()),
            Some(StoredData::List(values)) => Ok(values),
            Some(StoredData::Text(_)) => Err(wrong_type(key)),
        }
    }

    async fn push(&self, key: &str, values: &[String]) -> CacheResult<()> {
        self.ensure_available()?;
        match self.inner.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredValue::new(
                        StoredData::List(values.to_vec()),
                        Duration::ZERO,
                    ));
                    return Ok(());
                }
                match &mut occupied.get_mut().data {
                    StoredData::List(existing) => {
                        existing.extend_from_slice(values);
                        Ok(())
                    }
                    StoredData::Text(_) => Err(wrong_type(key)),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(
                    StoredData::List(values.to_vec()),
                    Duration::ZERO,
                ));
                Ok(())
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.ensure_available()?;
        if let Some(mut value) = self.inner.entries.get_mut(key) {
            if !value.is_expired() {
                value.expires_at = deadline(ttl);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> CacheResult<()> {
        self.ensure_available()?;
        self.inner.entries.clear();
        debug!(store = %self.inner.label, "Memory store flushed");
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        self.ensure_available()
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Several `MemoryStore`s addressed as one keyspace
#[derive(Debug, Clone)]
pub struct ShardedMemoryStore {
    shards: Vec<MemoryStore>,
}

impl ShardedMemoryStore {
    /// Build a keyspace over the given shards
    ///
    /// An empty list yields a single shard.
    pub fn new(shards: Vec<MemoryStore>) -> Self {
        let shards = if shards.is_empty() {
            vec![MemoryStore::new("memory-shard-0")]
        } else {
            shards
        };
        Self { shards }
    }

    /// Create `count` empty shards
    pub fn with_shards(count: usize) -> Self {
        Self::new(
            (0..count.max(1))
                .map(|i| MemoryStore::new(format!("memory-shard-{i}")))
                .collect(),
        )
    }

    pub fn shards(&self) -> &[MemoryStore] {
        &self.shards
    }

    /// Shard owning `key`, honouring `{tag}` hash tags like a cluster does
    pub fn shard_for(&self, key: &str) -> &MemoryStore {
        let mut hasher = DefaultHasher::new();
        hash_tag(key).hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }
}

impl KeyValueStore for ShardedMemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.shard_for(key).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.shard_for(key).set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        self.shard_for(key).set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let mut removed = 0;
        for key in keys {
            removed += self.shard_for(key).delete(std::slice::from_ref(key)).await?;
        }
        Ok(removed)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> CacheResult<bool> {
        self.shard_for(key).delete_if_equals(key, expected).await
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        for shard in &self.shards {
            keys.extend(shard.keys(pattern).await?);
        }
        Ok(keys)
    }

    async fn list(&self, key: &str) -> CacheResult<Vec<String>> {
        self.shard_for(key).list(key).await
    }

    async fn push(&self, key: &str, values: &[String]) -> CacheResult<()> {
        self.shard_for(key).push(key, values).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.shard_for(key).expire(key, ttl).await
    }

    async fn flush(&self) -> CacheResult<()> {
        for shard in &self.shards {
            shard.flush().await?;
        }
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        for shard in &self.shards {
            shard.ping().await?;
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory-sharded"
    }
}

/// Redis `KEYS`/`SCAN MATCH` glob semantics: `*`, `?`, `[set]`, `[^set]`, `[a-z]`, `\x`
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position to resume from after the last `*`
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    } else if text[t] == '[' {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
                '\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }
        match backtrack {
            Some((star, consumed)) => {
                p = star + 1;
                t = consumed + 1;
                backtrack = Some((star, consumed + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Match `c` against the class starting at `pattern[start] == '['`
///
/// Returns `(matched, index after the class)`, or `None` for an unterminated class.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = i < pattern.len() && pattern[i] == '^';
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let current = pattern[i];
        if current == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;
        if current == '\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == c;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            let (low, high) = if current <= pattern[i + 2] {
                (current, pattern[i + 2])
            } else {
                (pattern[i + 2], current)
            };
            matched |= (low..=high).contains(&c);
            i += 3;
        } else {
            matched |= current == c;
            i += 1;
        }
    }
    None
}
