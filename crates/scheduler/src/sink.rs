use crate::error::{GenerationError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Where shadow text is read from and generated code is written to.
///
/// The filesystem implementation is [`FileSink`]; an editor integration would route the
/// same calls through its buffers.
#[async_trait]
pub trait TargetSink: Send + Sync {
    /// `None` when the file does not exist yet.
    async fn read(&self, path: &Path) -> Result<Option<String>>;

    async fn append(&self, path: &Path, fragment: &str) -> Result<()>;

    async fn replace(&self, path: &Path, text: &str) -> Result<()>;
}

fn target_error(action: &str, path: &Path, err: std::io::Error) -> GenerationError {
    GenerationError::Target(format!("failed to {action} {}: {err}", path.display()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileSink;

#[async_trait]
impl TargetSink for FileSink {
    async fn read(&self, path: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(target_error("read", path, err)),
        }
    }

    async fn append(&self, path: &Path, fragment: &str) -> Result<()> {
        ensure_parent(path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|err| target_error("open", path, err))?;
        file.write_all(fragment.as_bytes())
            .await
            .map_err(|err| target_error("append to", path, err))?;
        file.flush()
            .await
            .map_err(|err| target_error("flush", path, err))
    }

    async fn replace(&self, path: &Path, text: &str) -> Result<()> {
        ensure_parent(path).await?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|err| target_error("write", &tmp, err))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|err| target_error("replace", path, err))
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| target_error("create directory for", path, err))?;
    }
    Ok(())
}

/// Buffers held in memory, as an editor would hold them.
#[derive(Debug, Default)]
pub struct MemorySink {
    buffers: Mutex<HashMap<PathBuf, String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.buffers.lock().await.insert(path.into(), text.into());
    }

    pub async fn get(&self, path: &Path) -> Option<String> {
        self.buffers.lock().await.get(path).cloned()
    }
}

#[async_trait]
impl TargetSink for MemorySink {
    async fn read(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.get(path).await)
    }

    async fn append(&self, path: &Path, fragment: &str) -> Result<()> {
        self.buffers
            .lock()
            .await
            .entry(path.to_path_buf())
            .or_default()
            .push_str(fragment);
        Ok(())
    }

    async fn replace(&self, path: &Path, text: &str) -> Result<()> {
        self.insert(path, text).await;
        Ok(())
    }
}
