use crate::config::SyncConfig;
use crate::generator::CommandGenerator;
use anyhow::{Context as AnyhowContext, Result};
use shadow_checkpoint::{default_checkpoint_path, JsonCheckpointStore};
use shadow_deps::{ProcessRunner, ResolverOptions};
use shadow_pipeline::PromptLibrary;
use shadow_protocol::{ShadowLayout, ShadowPair};
use shadow_scheduler::{ConversionPipeline, FileSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A project root with its layout, config and checkpoint store.
pub struct Workspace {
    root: PathBuf,
    layout: ShadowLayout,
    config: SyncConfig,
    checkpoints: Arc<JsonCheckpointStore>,
}

impl Workspace {
    pub async fn open(root: &Path, config: SyncConfig) -> Result<Self> {
        let root = tokio::fs::canonicalize(root)
            .await
            .with_context(|| format!("Project root {} not found", root.display()))?;
        let layout = ShadowLayout::new(&root).with_mirror_dir(config.shadow.dir.as_str());
        let store_path = default_checkpoint_path(&layout.mirror_root());
        let checkpoints = JsonCheckpointStore::open(&store_path)
            .await
            .with_context(|| format!("Failed to open checkpoints {}", store_path.display()))?;
        Ok(Self {
            root,
            layout,
            config,
            checkpoints: Arc::new(checkpoints),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn layout(&self) -> &ShadowLayout {
        &self.layout
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn checkpoints(&self) -> &Arc<JsonCheckpointStore> {
        &self.checkpoints
    }

    /// Pairs a user-supplied path, which may name either the shadow or the target.
    pub fn pair(&self, path: &Path) -> Result<ShadowPair> {
        let path = absolute(path)?;
        let pair = if ShadowLayout::is_shadow(&path) {
            self.layout.pair(&path)?
        } else {
            self.layout.pair_for_target(&path)?
        };
        Ok(pair)
    }

    /// Pairs a path that must name a target, never a shadow file.
    pub fn target_pair(&self, target: &Path) -> Result<ShadowPair> {
        Ok(self.layout.pair_for_target(&absolute(target)?)?)
    }

    #[must_use]
    pub fn pipeline(&self) -> ConversionPipeline {
        let generator = CommandGenerator::new(
            self.config.generator.command.clone(),
            Duration::from_millis(self.config.generator.timeout_ms),
        );
        let resolvers = ResolverOptions {
            auto_install: self.config.dependencies.auto_install,
            runner: Arc::new(ProcessRunner::new(Duration::from_millis(
                self.config.dependencies.install_timeout_ms,
            ))),
            ..ResolverOptions::default()
        };
        ConversionPipeline::new(
            self.root.clone(),
            Arc::new(generator),
            Arc::new(FileSink),
            self.checkpoints.clone(),
        )
        .with_prompts(PromptLibrary::new(self.config.prompts_dir(&self.root)))
        .with_resolver_options(resolvers)
    }
}

/// Absolute form of `path`, resolving symlinks in whatever prefix already exists.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(path)
    };
    if let Ok(canonical) = joined.canonicalize() {
        return Ok(canonical);
    }

    let mut existing = joined.as_path();
    let mut missing = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            missing.push(name.to_os_string());
        }
        existing = parent;
        if let Ok(mut canonical) = existing.canonicalize() {
            canonical.extend(missing.iter().rev());
            return Ok(canonical);
        }
    }
    Ok(joined)
}
