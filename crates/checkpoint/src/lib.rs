//! # Shadow Checkpoint
//!
//! Remembers, per shadow file, the last pseudocode that was fully converted so the
//! next conversion only has to send the delta.
//!
//! ```text
//! shadow id ──get──> last converted text ──DiffEngine──> delta
//!      ▲                                                   │
//!      └──────────────set (after output applied)───────────┘
//! ```
//!
//! Stores only hold text; they never decide when to advance. Stale entries whose
//! shadow file has disappeared are dropped by [`cleanup_ghost_checkpoints`].

mod cleanup;
mod error;
mod file;
mod memory;

pub use cleanup::cleanup_ghost_checkpoints;
pub use error::{CheckpointError, Result};
pub use file::{default_checkpoint_path, JsonCheckpointStore, CHECKPOINT_SCHEMA_VERSION};
pub use memory::MemoryCheckpointStore;

use async_trait::async_trait;

/// Persisted mapping from shadow-file identity to last converted pseudocode.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<String>>;

    async fn set(&self, id: &str, text: &str) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn list_ids(&self) -> Result<Vec<String>>;
}
