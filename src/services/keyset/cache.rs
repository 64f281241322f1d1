//! Per-URL JWKS cache.
//!
//! MyInfo requires key sets to be cached for at least one hour and not
//! refetched for every validation. A key-id miss triggers exactly one forced
//! refetch (key rotation) before the verification fails permanently.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::FlowError;
use crate::services::keyset::KeySet;
use crate::transport::client::{ApiRequest, Transport};

struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

pub struct KeySetCache {
    transport: Arc<dyn Transport>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedKeySet>>,
}

impl KeySetCache {
    pub fn new(transport: Arc<dyn Transport>, ttl_seconds: u64) -> Self {
        Self {
            transport,
            ttl: Duration::from_secs(ttl_seconds),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Key set for `url`, served from cache while within TTL.
    pub async fn fetch(&self, url: &str) -> Result<Arc<KeySet>, FlowError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(url) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&cached.keys));
                }
            }
        }

        self.refresh(url).await
    }

    /// Unconditional refetch, replacing whatever is cached for `url`.
    pub async fn refresh(&self, url: &str) -> Result<Arc<KeySet>, FlowError> {
        let response = self.transport.request(ApiRequest::get(url)).await?;
        let keys = Arc::new(KeySet::parse(&response.body)?);

        debug!(url = %url, keys = keys.len(), "fetched remote key set");

        let mut cache = self.cache.write().await;
        cache.insert(
            url.to_string(),
            CachedKeySet {
                keys: Arc::clone(&keys),
                fetched_at: Instant::now(),
            },
        );

        Ok(keys)
    }
}
