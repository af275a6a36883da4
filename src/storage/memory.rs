use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{StorageBackend, StorageError};

/// In-memory storage backend.
///
/// One instance per room, owned by the hub so values outlive the room actor:
/// a retired (hibernated) actor rehydrates from here on its next event. The
/// durability contract is trivially met in process memory; a persistent
/// backend would slot in behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    values: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys (test convenience).
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.values.write().await.remove(key).is_some())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let values = self.values.read().await;
        Ok(values
            .keys()
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_get_delete() {
        let storage = InMemoryStorage::new();
        assert!(storage.is_empty().await);

        storage.put("room", json!({"a": 1})).await.unwrap();
        assert_eq!(storage.get("room").await.unwrap().unwrap()["a"], 1);
        assert_eq!(storage.len().await, 1);

        assert!(storage.delete("room").await.unwrap());
        assert!(storage.get("room").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_sorted_and_prefix_filtered() {
        let storage = InMemoryStorage::new();
        storage.put("seats", json!([])).await.unwrap();
        storage.put("room", json!({})).await.unwrap();
        storage.put("alarm_queue", json!([])).await.unwrap();

        let all = storage.list(None).await.unwrap();
        assert_eq!(all, vec!["alarm_queue", "room", "seats"]);

        let filtered = storage.list(Some("s")).await.unwrap();
        assert_eq!(filtered, vec!["seats"]);
    }
}
