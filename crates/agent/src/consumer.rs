use std::{sync::Arc, time::Duration};

use relaybot_chat::{DeliveryDispatcher, DeliveryReport};
use relaybot_core::{CorrelationEnvelope, PipelineError};
use relaybot_queue::{QueueConsumer, QueueError, QueueMessage};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// Blocked on the next queue read.
    Waiting,
    Processing,
}

impl ConsumerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Delivered(DeliveryReport),
    /// The message could not be decoded and was dropped.
    Skipped(PipelineError),
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("queue read failed: {0}")]
    QueueRead(#[from] QueueError),
    #[error("consumer task did not stop within {0:?}")]
    ShutdownTimedOut(Duration),
    #[error("consumer task aborted: {0}")]
    Panicked(String),
}

/// The single reader of the reply queue.
///
/// Messages are handled one at a time in queue order. A message that fails to
/// decode is logged and skipped; a failed read ends the loop. The position is
/// committed after each delivery attempt, so a restart can redeliver the
/// message that was in flight.
pub struct ConsumerLoop {
    queue: Arc<dyn QueueConsumer>,
    delivery: DeliveryDispatcher,
    state: watch::Sender<ConsumerState>,
}

impl ConsumerLoop {
    pub fn new(queue: Arc<dyn QueueConsumer>, delivery: DeliveryDispatcher) -> Self {
        let (state, _) = watch::channel(ConsumerState::Waiting);
        Self { queue, delivery, state }
    }

    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub async fn process(&self, message: &QueueMessage) -> ProcessOutcome {
        let decoded = CorrelationEnvelope::from_bytes(&message.value)
            .and_then(|envelope| envelope.open().map(|result| (envelope, result)));

        let (envelope, result) = match decoded {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(
                    event_name = "pipeline.consumer.message_skipped",
                    offset = %message.offset,
                    error = %error,
                    "queued message could not be decoded"
                );
                return ProcessOutcome::Skipped(error.into());
            }
        };

        let report = self.delivery.deliver(envelope.destination(), result.text_fragments()).await;
        info!(
            event_name = "pipeline.consumer.message_delivered",
            offset = %message.offset,
            destination = %envelope.destination(),
            attempted = report.attempted,
            delivered = report.delivered,
            "queued reply dispatched"
        );

        ProcessOutcome::Delivered(report)
    }

    /// Runs until cancelled or until a queue read fails. Cancellation is only
    /// observed between messages; a message being delivered is finished first.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ConsumerError> {
        info!(event_name = "pipeline.consumer.started", "consumer loop started");

        loop {
            self.state.send_replace(ConsumerState::Waiting);

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(event_name = "pipeline.consumer.stopped", "consumer loop cancelled");
                    return Ok(());
                }
                read = self.queue.next_message() => read,
            };

            let message = match read {
                Ok(message) => message,
                Err(read_error) => {
                    let failure = PipelineError::QueueRead(read_error.to_string());
                    error!(
                        event_name = "pipeline.consumer.read_failed",
                        error_kind = failure.kind(),
                        error = %failure,
                        "queue read failed; consumer loop is stopping"
                    );
                    return Err(ConsumerError::QueueRead(read_error));
                }
            };

            self.state.send_replace(ConsumerState::Processing);
            debug!(
                event_name = "pipeline.consumer.message_received",
                offset = %message.offset,
                bytes = message.value.len(),
                "queued message received"
            );

            self.process(&message).await;

            if let Err(commit_error) = self.queue.commit(&message).await {
                warn!(
                    event_name = "pipeline.consumer.commit_failed",
                    offset = %message.offset,
                    error = %commit_error,
                    "consumer position was not recorded; message may be redelivered"
                );
            }
        }
    }

    pub fn spawn(self) -> ConsumerHandle {
        let cancel = CancellationToken::new();
        let state = self.state();
        let task = tokio::spawn(self.run(cancel.clone()));
        ConsumerHandle { cancel, task, state }
    }
}

/// Joinable handle on a spawned [`ConsumerLoop`].
pub struct ConsumerHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ConsumerError>>,
    state: watch::Receiver<ConsumerState>,
}

impl ConsumerHandle {
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the task to end on its own. Must not be called again once it
    /// has returned.
    pub async fn wait(&mut self) -> Result<(), ConsumerError> {
        flatten((&mut self.task).await)
    }

    /// Cancels the loop and joins it, aborting the task if it does not stop
    /// within `grace`.
    pub async fn shutdown(self, grace: Duration) -> Result<(), ConsumerError> {
        self.cancel.cancel();
        let mut task = self.task;

        match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                task.abort();
                Err(ConsumerError::ShutdownTimedOut(grace))
            }
        }
    }
}

fn flatten(
    joined: Result<Result<(), ConsumerError>, tokio::task::JoinError>,
) -> Result<(), ConsumerError> {
    joined.map_err(|join_error| ConsumerError::Panicked(join_error.to_string()))?
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use chrono::Utc;
    use relaybot_chat::{ChatSender, DeliveryDispatcher, SendError};
    use relaybot_core::{
        CorrelationEnvelope, Destination, EnvelopeError, GenerationResult, PipelineError,
    };
    use relaybot_queue::{InMemoryQueue, QueueConsumer, QueueMessage, QueueOffset, QueueProducer};
    use tokio::sync::Mutex;

    use super::{ConsumerError, ConsumerLoop, ConsumerState, ProcessOutcome};

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatSender for RecordingSender {
        async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), SendError> {
            self.sent.lock().await.push((channel_id.to_owned(), text.to_owned()));
            Ok(())
        }
    }

    fn envelope_bytes(channel: &str, candidates: Vec<Vec<&str>>) -> Vec<u8> {
        let destination = Destination::new(channel).expect("destination");
        CorrelationEnvelope::seal(destination, &GenerationResult::from_candidates(candidates))
            .expect("seal")
            .to_bytes()
            .expect("encode")
    }

    fn message(value: Vec<u8>) -> QueueMessage {
        QueueMessage { offset: QueueOffset(0), value, enqueued_at: Utc::now() }
    }

    fn consumer(queue: Arc<InMemoryQueue>) -> (ConsumerLoop, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        (ConsumerLoop::new(queue, DeliveryDispatcher::new(sender.clone())), sender)
    }

    #[tokio::test]
    async fn fragments_are_sent_in_candidate_then_part_order() {
        let (consumer, sender) = consumer(Arc::new(InMemoryQueue::new()));

        let outcome = consumer
            .process(&message(envelope_bytes("C1", vec![vec!["a", "b"], vec!["c", "d"]])))
            .await;

        let ProcessOutcome::Delivered(report) = outcome else {
            panic!("expected delivery, got {outcome:?}");
        };
        assert_eq!(report.delivered, 4);
        let sent = sender.sent.lock().await.clone();
        let expected: Vec<(String, String)> =
            ["a", "b", "c", "d"].iter().map(|text| ("C1".to_owned(), (*text).to_owned())).collect();
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn empty_candidates_send_nothing() {
        let (consumer, sender) = consumer(Arc::new(InMemoryQueue::new()));

        let outcome = consumer.process(&message(envelope_bytes("C1", vec![]))).await;

        assert!(matches!(outcome, ProcessOutcome::Delivered(report) if report.attempted == 0));
        assert!(sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let (consumer, sender) = consumer(Arc::new(InMemoryQueue::new()));
        let destination = Destination::new("C1").expect("destination");
        let bad_payload = CorrelationEnvelope::new(destination, b"{\"candidates\": 7}".to_vec())
            .to_bytes()
            .expect("encode");

        let outcome = consumer.process(&message(bad_payload)).await;

        assert!(matches!(
            outcome,
            ProcessOutcome::Skipped(PipelineError::Serialization(EnvelopeError::DecodePayload(_)))
        ));
        assert!(sender.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn loop_skips_garbage_and_keeps_going_until_read_fails() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.publish(b"not an envelope".to_vec()).await.expect("publish");
        queue.publish(envelope_bytes("C2", vec![vec!["after"]])).await.expect("publish");
        queue.close().await;
        let (consumer, sender) = consumer(queue.clone());

        let mut handle = consumer.spawn();
        let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("loop should stop");

        assert!(matches!(result, Err(ConsumerError::QueueRead(_))));
        assert_eq!(
            sender.sent.lock().await.clone(),
            vec![("C2".to_owned(), "after".to_owned())]
        );
        assert_eq!(queue.committed_offset().await, Some(QueueOffset(1)));
    }

    #[tokio::test]
    async fn redelivered_message_is_sent_again() {
        let queue = Arc::new(InMemoryQueue::new());
        queue.publish(envelope_bytes("C1", vec![vec!["once"]])).await.expect("publish");
        let (consumer, sender) = consumer(queue.clone());

        let message = queue.next_message().await.expect("read");
        consumer.process(&message).await;
        queue.rewind_to_committed().await;
        let replay = queue.next_message().await.expect("read again");
        consumer.process(&replay).await;

        assert_eq!(sender.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_a_waiting_loop() {
        let (consumer, sender) = consumer(Arc::new(InMemoryQueue::new()));

        let handle = consumer.spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), ConsumerState::Waiting);
        assert!(!handle.is_finished());

        handle.shutdown(Duration::from_secs(5)).await.expect("clean shutdown");
        assert!(sender.sent.lock().await.is_empty());
    }
}
