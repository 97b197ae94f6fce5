use shadow_checkpoint::CheckpointError;
use shadow_pipeline::PipelineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Error, Debug)]
pub enum GenerationError {
    /// No generator is configured; nothing was sent and nothing is retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider, network or filtered-response failure. The next edit retries.
    #[error("Generation failed: {0}")]
    Transient(String),

    #[error("Target error: {0}")]
    Target(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl GenerationError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
