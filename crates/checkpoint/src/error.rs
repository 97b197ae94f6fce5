use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckpointError>;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid checkpoint path: {0}")]
    InvalidPath(String),
}
