//! Valkey/Redis-backed state store (SET NX EX / GET / DEL).
use async_trait::async_trait;
use std::time::Duration;

use crate::services::state::store::{StateStore, StoreError};

#[derive(Clone)]
pub struct ValkeyStateStore {
    manager: redis::aio::ConnectionManager,
}

impl ValkeyStateStore {
    /// Create a store from a URL like `redis://localhost:6379`.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::BackendConnection(e.to_string()))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::BackendConnection(e.to_string()))?;

        Ok(Self { manager })
    }
}

#[async_trait]
impl StateStore for ValkeyStateStore {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        // `SET key value NX EX <seconds>` answers OK when set, Nil when the
        // key already exists. EX expects integer seconds, clamp to >= 1.
        let mut conn = self.manager.clone();
        let ttl_seconds: u64 = ttl.as_secs().max(1);

        let resp: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendCommand(e.to_string()))?;

        Ok(resp.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();

        let resp: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendCommand(e.to_string()))?;

        Ok(resp)
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.manager.clone();

        let n: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::BackendCommand(e.to_string()))?;

        Ok(n)
    }
}
