use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("chat request failed: {0}")]
    Transport(String),
    #[error("chat api rejected message with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

/// Outbound "send text to channel" operation of the chat gateway.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), SendError>;
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

/// Posts messages through the Discord REST API.
///
/// Text is sent as one message with no splitting. Discord rejects content
/// longer than 2000 characters with a 400, which comes back as
/// [`SendError::Rejected`] and is logged by delivery as
/// `pipeline.delivery.send_failed`.
pub struct DiscordRestSender {
    client: Client,
    api_base_url: String,
    bot_token: SecretString,
}

impl DiscordRestSender {
    pub fn new(
        api_base_url: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SendError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            bot_token,
        })
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{channel_id}/messages", self.api_base_url)
    }
}

#[async_trait]
impl ChatSender for DiscordRestSender {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), SendError> {
        let response = self
            .client
            .post(self.messages_url(channel_id))
            .header("Authorization", format!("Bot {}", self.bot_token.expose_secret()))
            .json(&CreateMessage { content: text })
            .send()
            .await
            .map_err(|error| SendError::Transport(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(SendError::Rejected { status: status.as_u16(), detail })
    }
}
