use thiserror::Error;

pub type Result<T> = std::result::Result<T, DepsError>;

#[derive(Error, Debug)]
pub enum DepsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{program} timed out after {after_ms}ms")]
    Timeout { program: String, after_ms: u64 },

    #[error("Manifest is not a {expected} document")]
    UnexpectedShape { expected: &'static str },
}
