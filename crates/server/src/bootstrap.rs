use std::{sync::Arc, time::Duration};

use relaybot_agent::{
    CommandPipeline, ConsumerLoop, GeminiBackend, GenerationRequestor, GenerativeBackend,
};
use relaybot_chat::{
    events::{EventDispatcher, MessageCreateHandler},
    gateway::{GatewayRunner, ReconnectPolicy},
    ChatSender, DeliveryDispatcher, DiscordGatewayTransport, DiscordRestSender, SendError,
};
use relaybot_core::{
    config::{AppConfig, ConfigError},
    BotIdentity, CommandDetector, GenerationError,
};
use relaybot_queue::{connect_with_settings, migrations, EnvelopeProducer, QueuePool, SqlQueue};
use thiserror::Error;
use tracing::info;

const CHAT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    pub config: AppConfig,
    pub queue_pool: QueuePool,
    pub consumer: ConsumerLoop,
    pub gateway_runner: GatewayRunner,
    /// Shared with the gateway, which fills it in once the session is ready.
    pub bot_identity: BotIdentity,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("queue connection failed: {0}")]
    QueueConnect(#[source] sqlx::Error),
    #[error("queue migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("chat client setup failed: {0}")]
    ChatClient(#[source] SendError),
    #[error("generation backend setup failed: {0}")]
    Backend(#[source] GenerationError),
}

/// Builds every component from a loaded or hand-built config.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let queue_pool = connect_with_settings(
        &config.queue.broker_url,
        config.queue.max_connections,
        config.queue.timeout_secs,
    )
    .await
    .map_err(BootstrapError::QueueConnect)?;
    info!(
        event_name = "system.bootstrap.queue_connected",
        correlation_id = "bootstrap",
        topic = %config.queue.topic,
        partition = config.queue.partition,
        "queue connection established"
    );

    migrations::run_pending(&queue_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "queue migrations applied"
    );

    let queue = SqlQueue::new(queue_pool.clone(), config.queue.topic.clone(), config.queue.partition);
    let queue_consumer = queue.consumer(
        config.queue.consumer_group.clone(),
        Duration::from_millis(config.queue.poll_interval_ms),
    );

    let sender: Arc<dyn ChatSender> = Arc::new(
        DiscordRestSender::new(
            config.chat.api_base_url.clone(),
            config.chat.bot_token.clone(),
            CHAT_SEND_TIMEOUT,
        )
        .map_err(BootstrapError::ChatClient)?,
    );
    let backend: Arc<dyn GenerativeBackend> =
        Arc::new(GeminiBackend::new(&config.backend).map_err(BootstrapError::Backend)?);
    info!(
        event_name = "system.bootstrap.clients_ready",
        correlation_id = "bootstrap",
        model = %config.backend.model,
        "chat and generation clients initialized"
    );

    let bot_identity = BotIdentity::new(config.chat.bot_user_id.clone());
    let pipeline = CommandPipeline::new(
        CommandDetector::new(config.chat.trigger_prefix.clone(), bot_identity.clone()),
        GenerationRequestor::new(backend),
        EnvelopeProducer::new(Arc::new(queue)),
        DeliveryDispatcher::new(Arc::clone(&sender)),
    );

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageCreateHandler::new(pipeline));
    let transport =
        DiscordGatewayTransport::new(config.chat.bot_token.clone(), bot_identity.clone());
    let gateway_runner = GatewayRunner::new(
        Arc::new(transport),
        dispatcher,
        ReconnectPolicy::default(),
    );

    let consumer = ConsumerLoop::new(Arc::new(queue_consumer), DeliveryDispatcher::new(sender));

    Ok(Application { config, queue_pool, consumer, gateway_runner, bot_identity })
}
