use std::{str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type QueuePool = sqlx::SqlitePool;

/// Opens the queue log, creating the database file on first use.
pub async fn connect_with_settings(
    broker_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<QueuePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(broker_url)?.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}
