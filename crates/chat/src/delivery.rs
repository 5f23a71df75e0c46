use std::sync::Arc;

use relaybot_core::{Destination, PipelineError};
use tracing::{debug, warn};

use crate::outbound::ChatSender;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<PipelineError>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Sends reply fragments to their destination, one message per fragment,
/// in the order given. A failed send is logged and the rest still go out.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    sender: Arc<dyn ChatSender>,
}

impl DeliveryDispatcher {
    pub fn new(sender: Arc<dyn ChatSender>) -> Self {
        Self { sender }
    }

    pub async fn deliver<'a, I>(&self, destination: &Destination, fragments: I) -> DeliveryReport
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut report = DeliveryReport::default();

        for (index, fragment) in fragments.into_iter().enumerate() {
            report.attempted += 1;
            match self.sender.send_message(destination.as_str(), fragment).await {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(
                        event_name = "pipeline.delivery.sent",
                        destination = %destination,
                        fragment_index = index,
                        "reply fragment sent"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "pipeline.delivery.send_failed",
                        destination = %destination,
                        fragment_index = index,
                        error = %error,
                        "reply fragment could not be sent"
                    );
                    report.failures.push(PipelineError::Delivery(error.to_string()));
                }
            }
        }

        report
    }

    /// Best-effort notice to a channel; failures are only logged.
    pub async fn notify(&self, destination: &Destination, notice: &str) {
        if let Err(error) = self.sender.send_message(destination.as_str(), notice).await {
            warn!(
                event_name = "pipeline.delivery.notice_failed",
                destination = %destination,
                error = %error,
                "failure notice could not be sent"
            );
        }
    }
}
