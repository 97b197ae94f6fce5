use crate::{CheckpointStore, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Session-only store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(id).cloned())
    }

    async fn set(&self, id: &str, text: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(id.to_string(), text.to_string());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.entries.lock().await.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", "one").await.unwrap();
        store.set("a", "two").await.unwrap();
        store.set("b", "").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some(""));
        assert_eq!(store.list_ids().await.unwrap(), vec!["a", "b"]);

        store.remove("a").await.unwrap();
        store.remove("missing").await.unwrap();
        assert_eq!(store.list_ids().await.unwrap(), vec!["b"]);
    }
}
