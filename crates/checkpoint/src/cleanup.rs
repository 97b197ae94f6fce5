use crate::{CheckpointStore, Result};
use log::{debug, info};
use std::path::Path;

/// Drops checkpoints whose shadow file no longer exists.
///
/// An entry is removed only when the filesystem confirms the file is absent; entries
/// that cannot be checked (permissions, transient IO) are kept. Safe to run repeatedly
/// and alongside new writes.
pub async fn cleanup_ghost_checkpoints(store: &dyn CheckpointStore) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for id in store.list_ids().await? {
        if !confirmed_absent(&id).await {
            continue;
        }
        // A writer may have recreated the shadow file since the first probe.
        if !confirmed_absent(&id).await {
            continue;
        }
        store.remove(&id).await?;
        info!("Cleaned up ghost checkpoint: {id}");
        removed.push(id);
    }
    Ok(removed)
}

async fn confirmed_absent(id: &str) -> bool {
    match tokio::fs::try_exists(Path::new(id)).await {
        Ok(exists) => !exists,
        Err(err) => {
            debug!("Cannot verify shadow file {id}: {err}");
            false
        }
    }
}
