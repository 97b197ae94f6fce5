use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// What a generator hands back: the whole answer at once, or fragments as they arrive.
///
/// An empty answer is not an error. It means the model saw nothing to change.
pub enum Generation {
    Whole(String),
    Stream(BoxStream<'static, Result<String>>),
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whole(text) => f.debug_tuple("Whole").field(&text.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The external model. Timeouts are the implementation's business.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<Generation>;
}
