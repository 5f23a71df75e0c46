use std::{sync::Arc, time::Instant};

use relaybot_core::{GenerationError, GenerationResult};
use tracing::{info, warn};

use crate::llm::GenerativeBackend;

/// Forwards the raw command argument to the backend, empty or not, and
/// waits for the whole result.
#[derive(Clone)]
pub struct GenerationRequestor {
    backend: Arc<dyn GenerativeBackend>,
}

impl GenerationRequestor {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }

    pub async fn request(
        &self,
        prompt: &str,
        correlation_id: &str,
    ) -> Result<GenerationResult, GenerationError> {
        let started = Instant::now();
        let outcome = self.backend.generate(prompt).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => info!(
                event_name = "pipeline.generation.completed",
                correlation_id,
                elapsed_ms,
                candidates = result.candidates.len(),
                fragments = result.fragment_count(),
                "generation backend responded"
            ),
            Err(error) => warn!(
                event_name = "pipeline.generation.failed",
                correlation_id,
                elapsed_ms,
                error = %error,
                "generation backend failed"
            ),
        }

        outcome
    }
}
