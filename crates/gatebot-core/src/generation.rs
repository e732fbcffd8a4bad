use async_trait::async_trait;

use crate::Result;

/// Port for the generative-language backend.
///
/// Implementations return the answer text, or an error whose description is
/// shown to the user in place of an answer.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
