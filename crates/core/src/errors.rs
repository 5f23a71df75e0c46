use thiserror::Error;

use crate::envelope::EnvelopeError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation backend request failed: {0}")]
    Backend(String),
    #[error("generation backend returned an unreadable response: {0}")]
    MalformedResponse(String),
}

/// Every failure the bridge can hit. Each kind is handled where it occurs;
/// only [`PipelineError::QueueRead`] ends the consumer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Serialization(#[from] EnvelopeError),
    #[error("queue publish failed: {0}")]
    Publish(String),
    #[error("chat delivery failed: {0}")]
    Delivery(String),
    #[error("queue read failed: {0}")]
    QueueRead(String),
}

impl PipelineError {
    /// Short notice posted back to the originating channel.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Generation(_) => "Error generating content from Gemini.",
            Self::Serialization(EnvelopeError::EncodePayload(_)) => {
                "Error processing response from Gemini."
            }
            Self::Serialization(EnvelopeError::EncodeEnvelope(_))
            | Self::Serialization(EnvelopeError::EmptyDestination) => {
                "Error preparing message for the queue."
            }
            Self::Serialization(_) => "Error reading a queued reply.",
            Self::Publish(_) => "Error sending message to the queue.",
            Self::Delivery(_) => "Error delivering the reply.",
            Self::QueueRead(_) => "The reply queue is unavailable.",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation",
            Self::Serialization(_) => "serialization",
            Self::Publish(_) => "publish",
            Self::Delivery(_) => "delivery",
            Self::QueueRead(_) => "queue_read",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::envelope::EnvelopeError;
    use crate::errors::{GenerationError, PipelineError};

    #[test]
    fn generation_error_has_user_safe_message() {
        let error = PipelineError::from(GenerationError::Backend("quota exceeded".to_owned()));

        assert_eq!(error.user_message(), "Error generating content from Gemini.");
        assert_eq!(error.kind(), "generation");
        assert!(!error.user_message().contains("quota"));
    }

    #[test]
    fn serialization_messages_follow_the_failing_stage() {
        let payload = PipelineError::from(EnvelopeError::EncodePayload("bad".to_owned()));
        let envelope = PipelineError::from(EnvelopeError::EncodeEnvelope("bad".to_owned()));

        assert_eq!(payload.user_message(), "Error processing response from Gemini.");
        assert_eq!(envelope.user_message(), "Error preparing message for the queue.");
        assert_eq!(payload.kind(), "serialization");
    }

    #[test]
    fn publish_error_maps_to_queue_notice() {
        let error = PipelineError::Publish("broker unreachable".to_owned());

        assert_eq!(error.user_message(), "Error sending message to the queue.");
        assert_eq!(error.to_string(), "queue publish failed: broker unreachable");
    }
}
