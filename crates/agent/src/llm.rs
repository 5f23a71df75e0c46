use async_trait::async_trait;
use relaybot_core::{GenerationError, GenerationResult};

/// Generative-text backend: prompt text in, candidates and parts out.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult, GenerationError>;
}
