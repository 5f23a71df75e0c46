mod bootstrap;
mod health;
mod shutdown;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use relaybot_agent::ConsumerError;
use relaybot_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

use crate::{bootstrap::Application, shutdown::ShutdownSignal};

fn init_logging(config: &AppConfig) {
    use relaybot_core::config::LogFormat::*;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

enum Exit {
    Signal(std::io::Result<&'static str>),
    ConsumerStopped(Result<(), ConsumerError>),
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let Application { config, queue_pool, consumer, gateway_runner, bot_identity } =
        bootstrap::bootstrap_with_config(config).await?;

    let mut shutdown = ShutdownSignal::install().context("failed to install signal handlers")?;
    let mut consumer = consumer.spawn();
    health::spawn(
        &config.server.bind_address,
        config.server.health_check_port,
        queue_pool.clone(),
        consumer.state_receiver(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.gateway_transport_mode",
        transport_mode = gateway_runner.transport_name(),
        bot_user_id_configured = bot_identity.user_id().is_some(),
        correlation_id = "bootstrap",
        "gateway runner transport mode initialized"
    );
    let gateway = tokio::spawn(async move { gateway_runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        topic = %config.queue.topic,
        "relaybot-server started"
    );

    let exit = tokio::select! {
        signal = shutdown.recv() => Exit::Signal(signal),
        stopped = consumer.wait() => Exit::ConsumerStopped(stopped),
    };
    gateway.abort();

    match exit {
        Exit::Signal(signal) => {
            let signal = signal.context("failed to listen for shutdown signal")?;
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                signal,
                "relaybot-server stopping"
            );

            let grace = Duration::from_secs(config.server.graceful_shutdown_secs);
            let stopped = consumer.shutdown(grace).await;
            queue_pool.close().await;
            stopped.context("consumer loop did not stop cleanly")?;

            tracing::info!(
                event_name = "system.server.stopped",
                correlation_id = "shutdown",
                "relaybot-server stopped"
            );
            Ok(())
        }
        Exit::ConsumerStopped(stopped) => {
            queue_pool.close().await;
            tracing::error!(
                event_name = "system.server.consumer_exited",
                correlation_id = "shutdown",
                "consumer loop ended; shutting down"
            );
            stopped.context("consumer loop failed")?;
            bail!("consumer loop exited without a shutdown request")
        }
    }
}
