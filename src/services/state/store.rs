//! State-store interface used by the flow orchestrator (oauth state and
//! ephemeral key persistence).
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Store-layer errors (transport/command). Callers treat any backend error
/// as flow failure (fail-closed); state replay protection must never fail
/// open.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store connection error: {0}")]
    BackendConnection(String),
    #[error("state store command error: {0}")]
    BackendCommand(String),
}

/// A minimal string-based store.
///
/// The flow only needs atomic set-if-absent with TTL, get, and delete:
/// - `set_if_absent_with_ttl` returns `Ok(true)` when the key was newly set,
///   `Ok(false)` when it already existed.
/// - TTLs are coarse (seconds); entries self-expire, which is what bounds an
///   abandoned flow.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a key. Returns the number of deleted keys.
    async fn del(&self, key: &str) -> Result<u64, StoreError>;
}
