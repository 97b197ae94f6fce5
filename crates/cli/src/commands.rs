use crate::workspace::Workspace;
use anyhow::{bail, Context as AnyhowContext, Result};
use log::info;
use serde::Serialize;
use shadow_checkpoint::{cleanup_ghost_checkpoints, CheckpointStore};
use shadow_deps::ReconcileReport;
use shadow_protocol::{ShadowPair, SyncOutcome};
use shadow_scheduler::{ConversionOutcome, Liveness};
use std::path::{Path, PathBuf};

/// Creates the shadow file for `target`, seeding it and its checkpoint with the
/// target's current content. An existing shadow file is left alone.
pub async fn open(ws: &Workspace, target: &Path) -> Result<PathBuf> {
    let pair = ws.target_pair(target)?;
    if tokio::fs::try_exists(&pair.shadow).await.unwrap_or(false) {
        info!("Shadow file {} already exists", pair.shadow.display());
        return Ok(pair.shadow);
    }
    let content = read_target(&pair).await?;
    write_shadow(ws, &pair, &content).await?;
    info!("Opened {}", pair.shadow.display());
    Ok(pair.shadow)
}

/// Overwrites an existing shadow file with the target's current code.
pub async fn copy_code(ws: &Workspace, target: &Path) -> Result<PathBuf> {
    let pair = ws.target_pair(target)?;
    if !tokio::fs::try_exists(&pair.shadow).await.unwrap_or(false) {
        bail!(
            "No shadow file for {}; run `shadow-sync open` first",
            pair.target.display()
        );
    }
    let content = read_target(&pair).await?;
    write_shadow(ws, &pair, &content).await?;
    Ok(pair.shadow)
}

#[derive(Debug, Serialize)]
pub struct ConvertReport {
    pub shadow: PathBuf,
    pub target: PathBuf,
    pub outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<ReconcileReport>,
}

/// One conversion outside the watch loop, under the same checkpoint rules.
pub async fn convert(ws: &Workspace, path: &Path) -> Result<ConvertReport> {
    let pair = ws.pair(path)?;
    let pseudocode = read_shadow(&pair).await?;
    let checkpoint = ws
        .checkpoints()
        .get(&pair.shadow_id())
        .await
        .context("Failed to read checkpoint")?;

    let pipeline = ws.pipeline();
    let outcome = pipeline
        .convert(
            &pair,
            &pseudocode,
            Some(checkpoint.as_deref().unwrap_or_default()),
            &Liveness::always(),
        )
        .await
        .with_context(|| format!("Failed to convert {}", pair.shadow.display()))?;

    let (outcome, dependencies) = match outcome {
        ConversionOutcome::Converted {
            output_chars,
            reconcile,
        } => {
            let report = reconcile
                .await
                .context("Dependency reconciliation task failed")?;
            (SyncOutcome::Converted { output_chars }, Some(report))
        }
        ConversionOutcome::NoChanges => (SyncOutcome::Converted { output_chars: 0 }, None),
        ConversionOutcome::Unchanged => (SyncOutcome::Unchanged, None),
        ConversionOutcome::Discarded => (SyncOutcome::Discarded, None),
    };
    Ok(ConvertReport {
        shadow: pair.shadow,
        target: pair.target,
        outcome,
        dependencies,
    })
}

/// The diff block the next conversion would send.
pub async fn diff(ws: &Workspace, path: &Path) -> Result<String> {
    let pair = ws.pair(path)?;
    let pseudocode = read_shadow(&pair).await?;
    let checkpoint = ws
        .checkpoints()
        .get(&pair.shadow_id())
        .await
        .context("Failed to read checkpoint")?;
    Ok(ws
        .pipeline()
        .diff_engine()
        .diff(checkpoint.as_deref(), &pseudocode))
}

pub async fn cleanup(ws: &Workspace) -> Result<Vec<String>> {
    cleanup_ghost_checkpoints(ws.checkpoints().as_ref())
        .await
        .context("Ghost checkpoint cleanup failed")
}

async fn read_target(pair: &ShadowPair) -> Result<String> {
    match tokio::fs::read_to_string(&pair.target).await {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read {}", pair.target.display()))
        }
    }
}

async fn read_shadow(pair: &ShadowPair) -> Result<String> {
    tokio::fs::read_to_string(&pair.shadow)
        .await
        .with_context(|| format!("Failed to read shadow file {}", pair.shadow.display()))
}

async fn write_shadow(ws: &Workspace, pair: &ShadowPair, content: &str) -> Result<()> {
    if let Some(parent) = pair.shadow.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&pair.shadow, content)
        .await
        .with_context(|| format!("Failed to write {}", pair.shadow.display()))?;
    ws.checkpoints()
        .set(&pair.shadow_id(), content)
        .await
        .context("Failed to seed checkpoint")
}
