use shadow_checkpoint::{
    cleanup_ghost_checkpoints, default_checkpoint_path, CheckpointStore, JsonCheckpointStore,
    MemoryCheckpointStore,
};
use tempfile::TempDir;

#[tokio::test]
async fn removes_only_checkpoints_without_shadow_file() {
    let temp = TempDir::new().expect("tempdir");
    let live = temp.path().join("live.ts.shadow");
    std::fs::write(&live, "pseudo").expect("write shadow");
    let ghost = temp.path().join("ghost.ts.shadow");

    let store = MemoryCheckpointStore::new();
    let live_id = live.to_string_lossy().into_owned();
    let ghost_id = ghost.to_string_lossy().into_owned();
    store.set(&live_id, "pseudo").await.expect("set live");
    store.set(&ghost_id, "old").await.expect("set ghost");

    let removed = cleanup_ghost_checkpoints(&store).await.expect("cleanup");
    assert_eq!(removed, vec![ghost_id.clone()]);
    assert_eq!(store.get(&ghost_id).await.expect("get"), None);
    assert_eq!(
        store.get(&live_id).await.expect("get").as_deref(),
        Some("pseudo")
    );

    let again = cleanup_ghost_checkpoints(&store).await.expect("cleanup twice");
    assert!(again.is_empty());
}

#[tokio::test]
async fn cleanup_persists_removals() {
    let temp = TempDir::new().expect("tempdir");
    let path = default_checkpoint_path(temp.path());
    let ghost_id = temp
        .path()
        .join("gone.rs.shadow")
        .to_string_lossy()
        .into_owned();

    let store = JsonCheckpointStore::open(&path).await.expect("open");
    store.set(&ghost_id, "fn main").await.expect("set");
    cleanup_ghost_checkpoints(&store).await.expect("cleanup");
    drop(store);

    let reopened = JsonCheckpointStore::open(&path).await.expect("reopen");
    assert!(reopened.list_ids().await.expect("ids").is_empty());
}

#[tokio::test]
async fn concurrent_writes_survive_cleanup() {
    let temp = TempDir::new().expect("tempdir");
    let path = default_checkpoint_path(temp.path());
    let store = std::sync::Arc::new(JsonCheckpointStore::open(&path).await.expect("open"));

    let mut ids = Vec::new();
    for idx in 0..8 {
        let shadow = temp.path().join(format!("f{idx}.py.shadow"));
        std::fs::write(&shadow, "x").expect("write");
        let id = shadow.to_string_lossy().into_owned();
        store.set(&id, "x").await.expect("set");
        ids.push(id);
    }

    let writer = {
        let store = store.clone();
        let ids = ids.clone();
        tokio::spawn(async move {
            for id in ids {
                store.set(&id, "y").await.expect("set");
            }
        })
    };
    let removed = cleanup_ghost_checkpoints(store.as_ref())
        .await
        .expect("cleanup");
    writer.await.expect("writer");

    assert!(removed.is_empty());
    assert_eq!(store.list_ids().await.expect("ids").len(), ids.len());
}
