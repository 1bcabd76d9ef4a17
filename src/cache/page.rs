//! # Page Cache
//!
//! HTTP semantics on top of a backend client: which responses are admitted,
//! how `Vary` turns into storage keys and how long entries live.
//!
//! A stored page is two records with separate lock cycles. The negotiation
//! metadata list (`META@@<url>`) is rewritten first, then the encoded entry
//! (`DATA@@<url>@@...`). A reader between the two writes can observe new
//! metadata with an old or missing entry; that reads as a miss.

use super::client::BackendClient;
use super::codec::{self, CacheEntry};
use super::errors::CacheResult;
use super::headers::Headers;
use super::keys;
use super::ttl::resolve_ttl;
use crate::config::CacheConfig;
use crate::logging::log_cache_operation;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Entries shorter-lived than this are not worth storing
const MIN_TTL: Duration = Duration::from_secs(1);

const HEAD: &str = "HEAD";

/// Full-page cache over one backend
#[derive(Debug, Clone)]
pub struct PageCache {
    client: Arc<BackendClient>,
    config: CacheConfig,
}

impl PageCache {
    pub fn new(client: Arc<BackendClient>, config: CacheConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Arc<BackendClient> {
        &self.client
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store an upstream response; `Ok(false)` when it is not admitted
    ///
    /// `ttl_hint` overrides the lifetime derived from the response headers.
    #[allow(clippy::too_many_arguments)]
    pub async fn store_full_page(
        &self,
        method: &str,
        url: &str,
        status_code: u16,
        response_headers: &Headers,
        request_headers: &Headers,
        body: &[u8],
        ttl_hint: Option<Duration>,
    ) -> CacheResult<bool> {
        if !self.config.is_method_allowed(method) || method.eq_ignore_ascii_case(HEAD) {
            debug!(method = method, url = url, "Method not stored");
            return Ok(false);
        }
        if !self.config.is_status_allowed(status_code) {
            debug!(status_code, url = url, "Status not stored");
            return Ok(false);
        }
        if !keys::is_storable_url(url) {
            debug!(url = url, "URL contains the key separator, not stored");
            return Ok(false);
        }

        let negotiated = keys::vary_header_names(response_headers)?;

        let ttl = ttl_hint
            .unwrap_or_else(|| resolve_ttl(response_headers, self.config.default_ttl()));
        if ttl < MIN_TTL {
            debug!(url = url, ttl_ms = ttl.as_millis() as u64, "Response not cacheable");
            return Ok(false);
        }

        self.store_metadata(url, &negotiated, ttl).await?;

        let key = keys::storage_key(url, &negotiated, request_headers);
        let entry = CacheEntry::new(status_code, response_headers.clone(), body);
        self.client.set(&key, &codec::encode(&entry)?, ttl).await?;

        debug!(
            backend = self.client.name(),
            key = %key,
            ttl_seconds = ttl.as_secs(),
            "Page stored"
        );
        Ok(true)
    }

    /// Stored variant matching `request_headers`; `None` on a miss
    pub async fn retrieve_full_page(
        &self,
        method: &str,
        url: &str,
        request_headers: &Headers,
    ) -> CacheResult<Option<CacheEntry>> {
        if !self.config.is_method_allowed(method) {
            return Ok(None);
        }

        let negotiated = self.client.list(&keys::metadata_key(url)).await?;
        if negotiated.is_empty() {
            return Ok(None);
        }

        let key = keys::storage_key(url, &negotiated, request_headers);
        let encoded = match self.client.get(&key).await? {
            Some(encoded) if !encoded.is_empty() => encoded,
            _ => return Ok(None),
        };

        let entry = codec::decode(&encoded)?;
        if !self.config.is_status_allowed(entry.status_code) {
            debug!(key = %key, status_code = entry.status_code, "Stored status no longer allowed");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Remove the metadata and every stored variant of `url`
    ///
    /// Returns whether anything was removed. The first failure is returned
    /// after every delete has been attempted; purging again is safe.
    pub async fn purge_full_page(&self, method: &str, url: &str) -> CacheResult<bool> {
        let mut removed = 0;
        let mut first_error = None;

        match self.client.delete(&keys::metadata_key(url)).await {
            Ok(count) => removed += count,
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }

        for pattern in keys::variant_patterns(url) {
            let outcome = self.client.delete_wildcard(&pattern).await;
            removed += outcome.deleted;
            if let Some(err) = outcome.first_error {
                first_error.get_or_insert(err);
            }
        }

        let backend = self.client.name();
        match first_error {
            Some(err) => {
                let details = format!("{method}: {err}");
                log_cache_operation(
                    "purge",
                    backend,
                    Some(url),
                    "incomplete",
                    Some(removed),
                    Some(&details),
                );
                Err(err)
            }
            None => {
                log_cache_operation("purge", backend, Some(url), "ok", Some(removed), Some(method));
                Ok(removed > 0)
            }
        }
    }

    pub async fn ping(&self) -> bool {
        self.client.ping().await
    }

    /// Replace the negotiation metadata of `url`
    ///
    /// A response without `Vary` stores a single empty name so the list is
    /// never empty for a cached resource.
    async fn store_metadata(
        &self,
        url: &str,
        negotiated: &[String],
        ttl: Duration,
    ) -> CacheResult<()> {
        let meta_key = keys::metadata_key(url);
        let names = if negotiated.is_empty() {
            vec![String::new()]
        } else {
            negotiated.to_vec()
        };

        self.client.delete(&meta_key).await?;
        self.client.push(&meta_key, &names).await?;
        self.client.expire(&meta_key, ttl).await
    }
}
