use crate::workspace::Workspace;
use anyhow::{Context as AnyhowContext, Result};
use ignore::WalkBuilder;
use log::{debug, info, warn};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use shadow_protocol::{ShadowLayout, SyncOutcome, SyncUpdate};
use shadow_scheduler::GenerationScheduler;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, mpsc};

/// Every `*.shadow` file below the mirror directory, sorted.
#[must_use]
pub fn discover_shadows(mirror_root: &Path) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(mirror_root);
    builder
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false);

    let mut shadows: Vec<PathBuf> = builder
        .build()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
        .map(ignore::DirEntry::into_path)
        .filter(|path| ShadowLayout::is_shadow(path))
        .collect();
    shadows.sort();
    shadows
}

/// Converts shadow files as they change until Ctrl-C.
///
/// With no explicit paths every shadow file under the mirror directory is watched,
/// including ones created later.
pub async fn run(ws: &Workspace, explicit: &[PathBuf]) -> Result<()> {
    let mirror = ws.layout().mirror_root();
    tokio::fs::create_dir_all(&mirror)
        .await
        .with_context(|| format!("Failed to create {}", mirror.display()))?;

    let shadows = if explicit.is_empty() {
        discover_shadows(&mirror)
    } else {
        explicit
            .iter()
            .map(|path| ws.pair(path).map(|pair| pair.shadow))
            .collect::<Result<Vec<_>>>()?
    };

    let scheduler = GenerationScheduler::new(
        ws.pipeline(),
        ws.layout().clone(),
        ws.config().scheduler_config(),
    );
    for shadow in &shadows {
        scheduler
            .watch(shadow)
            .await
            .with_context(|| format!("Failed to watch {}", shadow.display()))?;
    }

    let (event_tx, mut event_rx) = mpsc::channel(1024);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.blocking_send(res);
        },
        NotifyConfig::default(),
    )
    .context("Failed to initialise the file watcher")?;
    watcher
        .watch(&mirror, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", mirror.display()))?;

    let mut updates = scheduler.subscribe_updates();
    let follow_new = explicit.is_empty();
    info!(
        "Watching {} shadow file(s) under {} (Ctrl-C to stop)",
        shadows.len(),
        mirror.display()
    );

    let result = loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                handle_event(&scheduler, event, follow_new).await;
            }
            update = updates.recv() => match update {
                Ok(update) => report(&update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {skipped} sync updates");
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
            signal = tokio::signal::ctrl_c() => {
                info!("Stopping watchers");
                break signal.context("Failed to listen for Ctrl-C");
            }
        }
    };

    drop(watcher);
    scheduler.shutdown().await;
    result
}

async fn handle_event(scheduler: &GenerationScheduler, event: notify::Result<Event>, follow_new: bool) {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            warn!("File watcher error: {err}");
            return;
        }
    };

    for path in event.paths.iter().filter(|path| ShadowLayout::is_shadow(path)) {
        let removed = matches!(event.kind, EventKind::Remove(_))
            || !tokio::fs::try_exists(path).await.unwrap_or(false);
        if removed {
            if scheduler.stop(path).is_some() {
                info!("{} was deleted; unwatched", path.display());
            }
            continue;
        }

        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            continue;
        }
        if !scheduler.is_watching(path) {
            if !follow_new {
                continue;
            }
            if let Err(err) = scheduler.watch(path).await {
                warn!("Cannot watch {}: {err}", path.display());
                continue;
            }
        }
        scheduler.notify_change(path);
    }
}

fn report(update: &SyncUpdate) {
    match &update.outcome {
        SyncOutcome::Converted { output_chars } => info!(
            "{} converted ({output_chars} chars, {} ms)",
            update.shadow_id, update.duration_ms
        ),
        SyncOutcome::Unchanged => debug!("{} unchanged", update.shadow_id),
        SyncOutcome::Failed { message, retryable } => {
            let hint = if *retryable { "; edit again to retry" } else { "" };
            warn!("{} failed: {message}{hint}", update.shadow_id);
        }
        SyncOutcome::Discarded => debug!("{} result discarded", update.shadow_id),
    }
}
