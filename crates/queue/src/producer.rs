use std::sync::Arc;

use relaybot_core::{CorrelationEnvelope, Destination, GenerationResult, PipelineError};
use tracing::{info, warn};

use crate::{QueueOffset, QueueProducer};

/// Writes one correlation envelope per successful command.
#[derive(Clone)]
pub struct EnvelopeProducer {
    queue: Arc<dyn QueueProducer>,
}

impl EnvelopeProducer {
    pub fn new(queue: Arc<dyn QueueProducer>) -> Self {
        Self { queue }
    }

    /// Both encoding steps finish before anything is written, so a failed
    /// encode never leaves a partial message on the queue. No retry here.
    pub async fn enqueue(
        &self,
        destination: &Destination,
        result: &GenerationResult,
    ) -> Result<QueueOffset, PipelineError> {
        let envelope = CorrelationEnvelope::seal(destination.clone(), result)?;
        let value = envelope.to_bytes()?;
        let value_len = value.len();

        let offset = self.queue.publish(value).await.map_err(|error| {
            warn!(
                event_name = "pipeline.enqueue.publish_failed",
                destination = %destination,
                error = %error,
                "queue rejected envelope"
            );
            PipelineError::Publish(error.to_string())
        })?;

        info!(
            event_name = "pipeline.enqueue.published",
            destination = %destination,
            offset = %offset,
            fragments = result.fragment_count(),
            bytes = value_len,
            "envelope published"
        );

        Ok(offset)
    }
}
