use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use relaybot_agent::ConsumerState;
use relaybot_queue::QueuePool;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    queue_pool: QueuePool,
    consumer_state: watch::Receiver<ConsumerState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queue: HealthCheck,
    pub consumer: HealthCheck,
    pub checked_at: String,
}

pub fn router(queue_pool: QueuePool, consumer_state: watch::Receiver<ConsumerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { queue_pool, consumer_state })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    queue_pool: QueuePool,
    consumer_state: watch::Receiver<ConsumerState>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(queue_pool, consumer_state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let queue = queue_check(&state.queue_pool).await;
    let consumer = consumer_check(&state.consumer_state);
    let ready = queue.status == "ready" && consumer.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        queue,
        consumer,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn queue_check(pool: &QueuePool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "queue storage query succeeded".to_string() },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("queue storage query failed: {error}"),
        },
    }
}

// The loop owns the sender; a closed channel means the task has ended.
fn consumer_check(state: &watch::Receiver<ConsumerState>) -> HealthCheck {
    if state.has_changed().is_err() {
        return HealthCheck { status: "degraded", detail: "consumer loop has stopped".to_string() };
    }

    HealthCheck { status: "ready", detail: format!("consumer loop {}", state.borrow().as_str()) }
}
