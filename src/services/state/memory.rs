//! In-memory state store for tests and single-process deployments.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::services::state::store::{StateStore, StoreError};

#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, StoreError>
    {
        self.entries
            .lock()
            .map_err(|_| StoreError::BackendCommand("poisoned lock".to_string()))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        match entries.get(key) {
            Some((_, deadline)) if *deadline > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), (value.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;

        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        let mut entries = self.lock()?;
        Ok(entries.remove(key).map(|_| 1).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_is_single_shot() {
        let store = MemoryStateStore::new();
        let ttl = Duration::from_secs(600);

        assert!(store.set_if_absent_with_ttl("k", "1", ttl).await.unwrap());
        assert!(!store.set_if_absent_with_ttl("k", "2", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn entries_expire() {
        let store = MemoryStateStore::new();

        store
            .set_if_absent_with_ttl("k", "1", Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        // Expired slot can be reclaimed.
        assert!(
            store
                .set_if_absent_with_ttl("k", "2", Duration::from_secs(600))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn del_reports_removal() {
        let store = MemoryStateStore::new();

        store
            .set_if_absent_with_ttl("k", "1", Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(store.del("k").await.unwrap(), 1);
        assert_eq!(store.del("k").await.unwrap(), 0);
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
