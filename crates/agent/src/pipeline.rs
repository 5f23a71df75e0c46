use async_trait::async_trait;
use relaybot_chat::{
    events::{EventContext, EventHandlerError, HandlerResult, MessageCreateEvent, MessageService},
    DeliveryDispatcher,
};
use relaybot_core::{CommandDetector, CommandMatch, Destination, PipelineError};
use relaybot_queue::{EnvelopeProducer, QueueOffset};
use tracing::{debug, info, warn};

use crate::requestor::GenerationRequestor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Not a command, or written by the bot itself.
    Ignored,
    Enqueued { offset: QueueOffset },
    /// The failure notice, if any, has already been sent.
    Failed(PipelineError),
}

/// Chat-event side of the bridge: detect a command, generate, enqueue.
///
/// Any failure before the write is reported back to the originating channel
/// and nothing reaches the queue for that command.
#[derive(Clone)]
pub struct CommandPipeline {
    detector: CommandDetector,
    requestor: GenerationRequestor,
    producer: EnvelopeProducer,
    notices: DeliveryDispatcher,
}

impl CommandPipeline {
    pub fn new(
        detector: CommandDetector,
        requestor: GenerationRequestor,
        producer: EnvelopeProducer,
        notices: DeliveryDispatcher,
    ) -> Self {
        Self { detector, requestor, producer, notices }
    }

    pub async fn handle(&self, event: &MessageCreateEvent, ctx: &EventContext) -> CommandOutcome {
        let argument = match self.detector.detect(&event.author_id, &event.content) {
            CommandMatch::Command { argument } => argument,
            CommandMatch::SelfAuthored | CommandMatch::NoTrigger => {
                debug!(
                    event_name = "pipeline.command.ignored",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %event.channel_id,
                    "message is not a command"
                );
                return CommandOutcome::Ignored;
            }
        };

        let destination = match Destination::new(event.channel_id.as_str()) {
            Ok(destination) => destination,
            Err(error) => {
                warn!(
                    event_name = "pipeline.command.no_destination",
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "command arrived without a channel id"
                );
                return CommandOutcome::Failed(error.into());
            }
        };

        info!(
            event_name = "pipeline.command.received",
            correlation_id = %ctx.correlation_id,
            destination = %destination,
            author_id = %event.author_id,
            prompt_chars = argument.chars().count(),
            "generation command received"
        );

        match self.generate_and_enqueue(argument, &destination, ctx).await {
            Ok(offset) => CommandOutcome::Enqueued { offset },
            Err(error) => {
                warn!(
                    event_name = "pipeline.command.failed",
                    correlation_id = %ctx.correlation_id,
                    destination = %destination,
                    error_kind = error.kind(),
                    error = %error,
                    "command failed before reaching the queue"
                );
                self.notices.notify(&destination, error.user_message()).await;
                CommandOutcome::Failed(error)
            }
        }
    }

    async fn generate_and_enqueue(
        &self,
        prompt: &str,
        destination: &Destination,
        ctx: &EventContext,
    ) -> Result<QueueOffset, PipelineError> {
        let result = self.requestor.request(prompt, &ctx.correlation_id).await?;
        self.producer.enqueue(destination, &result).await
    }
}

#[async_trait]
impl MessageService for CommandPipeline {
    async fn handle_message(
        &self,
        event: &MessageCreateEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        match self.handle(event, ctx).await {
            CommandOutcome::Ignored => Ok(HandlerResult::Ignored),
            CommandOutcome::Enqueued { .. } | CommandOutcome::Failed(_) => {
                Ok(HandlerResult::Processed)
            }
        }
    }
}
