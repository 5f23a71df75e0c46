//! Discord gateway ingress over serenity.
//!
//! serenity owns the websocket session and calls back into
//! [`DiscordEventHandler`]; the handler turns each created message into a
//! [`GatewayEnvelope`] and hands it to [`DiscordGatewayTransport`] over a
//! channel, so the [`GatewayRunner`](crate::gateway::GatewayRunner) pulls
//! Discord events the same way it pulls from any other transport.

use std::sync::Arc;

use async_trait::async_trait;
use relaybot_core::BotIdentity;
use secrecy::{ExposeSecret, SecretString};
use serenity::{
    all::{Context, EventHandler, GatewayIntents, Message, Ready, ShardManager},
    Client,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::{
    events::{ChatEvent, GatewayEnvelope, MessageCreateEvent},
    gateway::{GatewayTransport, TransportError},
};

type Inbound = Result<GatewayEnvelope, TransportError>;

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Receives serenity callbacks for one gateway session.
pub struct DiscordEventHandler {
    events: mpsc::UnboundedSender<Inbound>,
    identity: BotIdentity,
}

impl DiscordEventHandler {
    fn new(events: mpsc::UnboundedSender<Inbound>, identity: BotIdentity) -> Self {
        Self { events, identity }
    }

    fn record_ready(&self, user_id: String, user_name: &str) {
        info!(
            event_name = "ingress.discord.ready",
            bot_user_id = %user_id,
            bot_name = %user_name,
            "discord session ready"
        );
        self.identity.set(user_id);
    }

    fn forward(&self, envelope: GatewayEnvelope) {
        if self.events.send(Ok(envelope)).is_err() {
            warn!(
                event_name = "ingress.discord.receiver_gone",
                "gateway envelope dropped; transport is no longer reading"
            );
        }
    }
}

fn message_envelope(
    message_id: String,
    author_id: String,
    channel_id: String,
    content: String,
) -> GatewayEnvelope {
    GatewayEnvelope {
        envelope_id: message_id,
        event: ChatEvent::MessageCreate(MessageCreateEvent { author_id, channel_id, content }),
    }
}

#[serenity::async_trait]
impl EventHandler for DiscordEventHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.record_ready(ready.user.id.to_string(), &ready.user.name);
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        self.forward(message_envelope(
            msg.id.to_string(),
            msg.author.id.to_string(),
            msg.channel_id.to_string(),
            msg.content,
        ));
    }
}

/// [`GatewayTransport`] backed by a serenity client.
///
/// The bot's own user id is written into the shared [`BotIdentity`] when the
/// session becomes ready, so the self-message filter works without it being
/// configured up front.
pub struct DiscordGatewayTransport {
    bot_token: SecretString,
    identity: BotIdentity,
    events: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    shards: Mutex<Option<Arc<ShardManager>>>,
}

impl DiscordGatewayTransport {
    pub fn new(bot_token: SecretString, identity: BotIdentity) -> Self {
        Self { bot_token, identity, events: Mutex::new(None), shards: Mutex::new(None) }
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    async fn install(
        &self,
        events: mpsc::UnboundedReceiver<Inbound>,
        shards: Option<Arc<ShardManager>>,
    ) {
        *self.events.lock().await = Some(events);
        *self.shards.lock().await = shards;
    }
}

#[async_trait]
impl GatewayTransport for DiscordGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handler = DiscordEventHandler::new(sender.clone(), self.identity.clone());

        let mut client = Client::builder(self.bot_token.expose_secret(), intents())
            .event_handler(handler)
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let shards = Arc::clone(&client.shard_manager);

        tokio::spawn(async move {
            if let Err(error) = client.start().await {
                let _ = sender.send(Err(TransportError::Receive(error.to_string())));
            }
        });

        self.install(receiver, Some(shards)).await;
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        let mut events = self.events.lock().await;
        let Some(receiver) = events.as_mut() else {
            return Err(TransportError::Receive("discord transport is not connected".to_owned()));
        };

        match receiver.recv().await {
            Some(inbound) => inbound.map(Some),
            None => Ok(None),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.events.lock().await.take();
        if let Some(shards) = self.shards.lock().await.take() {
            shards.shutdown_all().await;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}
