use crate::error::Result;
use crate::generator::{Generation, Generator};
use crate::sink::TargetSink;
use futures::StreamExt;
use log::{debug, info, warn};
use shadow_checkpoint::CheckpointStore;
use shadow_deps::{resolver_for, ManifestContext, ReconcileReport, ResolverOptions};
use shadow_pipeline::{
    strip_code_fence, DiffEngine, DirectiveContextExtractor, PromptAssembler, PromptInputs,
    PromptLibrary,
};
use shadow_protocol::{DirectiveScanner, ShadowPair};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Whether the shadow file a conversion belongs to is still being watched.
///
/// Checked before every write to the target. A closed channel counts as unwatched.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    rx: Option<watch::Receiver<bool>>,
}

impl Liveness {
    /// Never goes away; used by one-shot conversions.
    #[must_use]
    pub const fn always() -> Self {
        Self { rx: None }
    }

    #[must_use]
    pub const fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        match &self.rx {
            None => true,
            Some(rx) => *rx.borrow() && rx.has_changed().is_ok(),
        }
    }
}

#[derive(Debug)]
pub enum ConversionOutcome {
    /// Output applied, checkpoint advanced. `reconcile` is the detached dependency pass.
    Converted {
        output_chars: usize,
        reconcile: JoinHandle<ReconcileReport>,
    },
    /// The model answered with nothing; the target is untouched but the checkpoint advanced.
    NoChanges,
    /// Pseudocode matched the checkpoint, so the model was never called.
    Unchanged,
    /// The shadow file was unwatched before the output could be applied.
    Discarded,
}

/// diff → context → prompts → generator → target → checkpoint → dependencies.
pub struct ConversionPipeline {
    root: PathBuf,
    generator: Arc<dyn Generator>,
    sink: Arc<dyn TargetSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    prompts: PromptLibrary,
    diff: DiffEngine,
    context: DirectiveContextExtractor,
    assembler: PromptAssembler,
    resolvers: ResolverOptions,
}

impl ConversionPipeline {
    pub fn new(
        root: impl Into<PathBuf>,
        generator: Arc<dyn Generator>,
        sink: Arc<dyn TargetSink>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let root = root.into();
        Self {
            context: DirectiveContextExtractor::new(root.clone()),
            root,
            generator,
            sink,
            checkpoints,
            prompts: PromptLibrary::default(),
            diff: DiffEngine::default(),
            assembler: PromptAssembler,
            resolvers: ResolverOptions::default(),
        }
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    #[must_use]
    pub fn with_resolver_options(mut self, options: ResolverOptions) -> Self {
        self.resolvers = options;
        self
    }

    #[must_use]
    pub fn with_directive_scanner(mut self, scanner: DirectiveScanner) -> Self {
        self.context = self.context.with_scanner(scanner.clone());
        self.diff = DiffEngine::new(scanner);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn TargetSink> {
        &self.sink
    }

    #[must_use]
    pub fn diff_engine(&self) -> &DiffEngine {
        &self.diff
    }

    /// Converts `pseudocode` into the pair's target.
    ///
    /// The checkpoint is written only after the final text has been applied. Nothing is
    /// written to the target once `liveness` reports the shadow file gone.
    pub async fn convert(
        &self,
        pair: &ShadowPair,
        pseudocode: &str,
        checkpoint: Option<&str>,
        liveness: &Liveness,
    ) -> Result<ConversionOutcome> {
        let shadow_id = pair.shadow_id();
        if checkpoint == Some(pseudocode) {
            debug!("{shadow_id} matches its checkpoint; nothing to convert");
            return Ok(ConversionOutcome::Unchanged);
        }

        let diff = self.diff.diff(checkpoint, pseudocode);
        let context = self.context.render(pseudocode).await;
        let existing = self.sink.read(&pair.target).await?.unwrap_or_default();

        let mut templates = self.prompts.load(&pair.language).await?;
        let resolver = resolver_for(&pair.language, &self.resolvers);
        let ManifestContext {
            prompt,
            location: manifest_path,
            text: manifest_text,
        } = resolver
            .extract_manifest_context(&pair.target, &self.root, &templates.user)
            .await;
        templates.user = prompt;

        let prompts = self.assembler.assemble(
            &templates,
            PromptInputs {
                language: &pair.language,
                diff: &diff,
                context: &context,
                existing_code: &existing,
            },
        );

        info!(
            "Generating {} from {}",
            pair.target.display(),
            pair.shadow.display()
        );
        let generation = self
            .generator
            .generate(&prompts.system, &prompts.user)
            .await?;

        let Some(raw) = self.collect(pair, generation, &existing, liveness).await? else {
            return Ok(ConversionOutcome::Discarded);
        };
        let output = strip_code_fence(&raw);

        if output.is_empty() {
            if raw.is_empty() {
                info!("Model reported no changes for {}", pair.target.display());
            } else if liveness.is_alive() {
                // Whitespace or a bare fence was streamed in; put the file back.
                self.sink.replace(&pair.target, &existing).await?;
            }
            if !liveness.is_alive() {
                return Ok(ConversionOutcome::Discarded);
            }
            self.checkpoints.set(&shadow_id, pseudocode).await?;
            return Ok(ConversionOutcome::NoChanges);
        }

        if !liveness.is_alive() {
            debug!("{shadow_id} was unwatched before output could be applied; discarding");
            return Ok(ConversionOutcome::Discarded);
        }
        self.sink.replace(&pair.target, &output).await?;
        self.checkpoints.set(&shadow_id, pseudocode).await?;
        info!(
            "Converted {} ({} chars)",
            pair.target.display(),
            output.chars().count()
        );

        let output_chars = output.chars().count();
        let reconcile = tokio::spawn(async move {
            let report = resolver
                .reconcile(manifest_path.as_deref(), &manifest_text, &output)
                .await;
            if report.is_warning() {
                warn!("Dependency reconciliation ({}): {report:?}", resolver.name());
            } else {
                debug!("Dependency reconciliation ({}): {report:?}", resolver.name());
            }
            report
        });

        Ok(ConversionOutcome::Converted {
            output_chars,
            reconcile,
        })
    }

    /// Drains the generation, appending streamed fragments live.
    ///
    /// Returns `None` when the file was unwatched mid-stream; anything already appended
    /// is rolled back to `existing`.
    async fn collect(
        &self,
        pair: &ShadowPair,
        generation: Generation,
        existing: &str,
        liveness: &Liveness,
    ) -> Result<Option<String>> {
        let mut stream = match generation {
            Generation::Whole(text) => return Ok(Some(text)),
            Generation::Stream(stream) => stream,
        };

        let mut accumulated = String::new();
        let mut appended = false;
        while let Some(fragment) = stream.next().await {
            let fragment = match fragment {
                Ok(fragment) => fragment,
                Err(err) => {
                    if appended {
                        self.sink.replace(&pair.target, existing).await?;
                    }
                    return Err(err);
                }
            };
            if !liveness.is_alive() {
                debug!(
                    "{} was unwatched mid-stream; discarding partial output",
                    pair.shadow_id()
                );
                if appended {
                    self.sink.replace(&pair.target, existing).await?;
                }
                return Ok(None);
            }
            if fragment.is_empty() {
                continue;
            }
            if !appended {
                // Streamed text replaces the old body; start from an empty file.
                self.sink.replace(&pair.target, "").await?;
                appended = true;
            }
            self.sink.append(&pair.target, &fragment).await?;
            accumulated.push_str(&fragment);
        }
        Ok(Some(accumulated))
    }
}
