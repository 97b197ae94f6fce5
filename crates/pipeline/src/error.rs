use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid directive names: {0}")]
    DirectiveError(#[from] regex::Error),

    #[error("Diff does not apply: {0}")]
    DiffMismatch(String),

    #[error("Invalid prompt template {name}: {reason}")]
    TemplateError { name: String, reason: String },
}
