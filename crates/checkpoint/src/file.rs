use crate::{CheckpointError, CheckpointStore, Result};
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use shadow_protocol::{checkpoint_key, id_from_checkpoint_key};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

const CHECKPOINT_FILE_NAME: &str = "checkpoints.json";

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCheckpoints {
    schema_version: u32,
    #[serde(default)]
    checkpoints: BTreeMap<String, String>,
}

/// Checkpoint file kept next to the shadow files.
#[must_use]
pub fn default_checkpoint_path(mirror_root: &Path) -> PathBuf {
    mirror_root.join(CHECKPOINT_FILE_NAME)
}

/// Write-through JSON store. Every mutation rewrites the file atomically
/// (temp file + rename), so a crash leaves either the old or the new mapping.
#[derive(Debug)]
pub struct JsonCheckpointStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonCheckpointStore {
    /// Loads the store at `path`. A missing file is an empty store; an unreadable
    /// or incompatible file is logged and replaced on the next write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.file_name().is_none() {
            return Err(CheckpointError::InvalidPath(path.display().to_string()));
        }
        let entries = read_entries(&path).await?;
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedCheckpoints {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            checkpoints: entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

async fn read_entries(path: &Path) -> Result<BTreeMap<String, String>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => return Err(err.into()),
    };
    let persisted: PersistedCheckpoints = match serde_json::from_slice(&bytes) {
        Ok(persisted) => persisted,
        Err(err) => {
            warn!("Checkpoint file {} is corrupted: {err}", path.display());
            return Ok(BTreeMap::new());
        }
    };
    if persisted.schema_version != CHECKPOINT_SCHEMA_VERSION {
        warn!(
            "Checkpoint file {} has schema_version {} (expected {CHECKPOINT_SCHEMA_VERSION}); ignoring it",
            path.display(),
            persisted.schema_version
        );
        return Ok(BTreeMap::new());
    }
    Ok(persisted.checkpoints)
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(&checkpoint_key(id)).cloned())
    }

    async fn set(&self, id: &str, text: &str) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let key = checkpoint_key(id);
        if guard.get(&key).map(String::as_str) == Some(text) {
            return Ok(());
        }
        let previous = guard.insert(key.clone(), text.to_string());
        if let Err(err) = self.persist(&guard).await {
            match previous {
                Some(previous) => guard.insert(key, previous),
                None => guard.remove(&key),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let key = checkpoint_key(id);
        let Some(previous) = guard.remove(&key) else {
            return Ok(());
        };
        if let Err(err) = self.persist(&guard).await {
            guard.insert(key, previous);
            return Err(err);
        }
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .await
            .keys()
            .filter_map(|key| id_from_checkpoint_key(key))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn survives_reopen() {
        let temp = TempDir::new().expect("tempdir");
        let path = default_checkpoint_path(&temp.path().join(".shadows"));

        let store = JsonCheckpointStore::open(&path).await.expect("open");
        store.set("/p/a.ts.shadow", "line 1\nline 2").await.expect("set");
        store.set("/p/b.ts.shadow", "x").await.expect("set");
        store.remove("/p/b.ts.shadow").await.expect("remove");
        drop(store);

        let reopened = JsonCheckpointStore::open(&path).await.expect("reopen");
        assert_eq!(
            reopened.get("/p/a.ts.shadow").await.expect("get").as_deref(),
            Some("line 1\nline 2")
        );
        assert_eq!(reopened.get("/p/b.ts.shadow").await.expect("get"), None);
        assert_eq!(
            reopened.list_ids().await.expect("ids"),
            vec!["/p/a.ts.shadow".to_string()]
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn keys_are_namespaced_on_disk() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("checkpoints.json");
        let store = JsonCheckpointStore::open(&path).await.expect("open");
        store.set("id-1", "text").await.expect("set");

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(raw["schema_version"], CHECKPOINT_SCHEMA_VERSION);
        assert_eq!(raw["checkpoints"]["shadow_checkpoint_id-1"], "text");
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty_and_is_rewritten() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("checkpoints.json");
        std::fs::write(&path, b"{not json").expect("write");

        let store = JsonCheckpointStore::open(&path).await.expect("open");
        assert!(store.list_ids().await.expect("ids").is_empty());
        store.set("a", "b").await.expect("set");

        let reopened = JsonCheckpointStore::open(&path).await.expect("reopen");
        assert_eq!(reopened.get("a").await.expect("get").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn foreign_keys_are_not_listed() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("checkpoints.json");
        std::fs::write(
            &path,
            br#"{"schema_version":1,"checkpoints":{"other":"x","shadow_checkpoint_a":"y"}}"#,
        )
        .expect("write");
        let store = JsonCheckpointStore::open(&path).await.expect("open");
        assert_eq!(store.list_ids().await.expect("ids"), vec!["a".to_string()]);
    }
}
