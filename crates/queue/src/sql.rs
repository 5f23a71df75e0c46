use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{QueueConsumer, QueueError, QueueMessage, QueueOffset, QueuePool, QueueProducer};

/// Durable single-partition log kept in SQLite.
#[derive(Clone)]
pub struct SqlQueue {
    pool: QueuePool,
    topic: String,
    partition: u32,
}

impl SqlQueue {
    pub fn new(pool: QueuePool, topic: impl Into<String>, partition: u32) -> Self {
        Self { pool, topic: topic.into(), partition }
    }

    pub fn consumer(
        &self,
        consumer_group: impl Into<String>,
        poll_interval: Duration,
    ) -> SqlQueueConsumer {
        SqlQueueConsumer {
            queue: self.clone(),
            consumer_group: consumer_group.into(),
            poll_interval,
            position: Mutex::new(None),
        }
    }
}

#[async_trait]
impl QueueProducer for SqlQueue {
    async fn publish(&self, value: Vec<u8>) -> Result<QueueOffset, QueueError> {
        let result = sqlx::query(
            "INSERT INTO queue_message (topic, partition_id, value, enqueued_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&self.topic)
        .bind(i64::from(self.partition))
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(QueueOffset(result.last_insert_rowid()))
    }
}

/// Reads one topic/partition in offset order, polling while the log is
/// drained. The position advances on read; `commit` persists it.
pub struct SqlQueueConsumer {
    queue: SqlQueue,
    consumer_group: String,
    poll_interval: Duration,
    position: Mutex<Option<i64>>,
}

impl SqlQueueConsumer {
    pub async fn committed_offset(&self) -> Result<Option<QueueOffset>, QueueError> {
        let offset = sqlx::query_scalar::<_, i64>(
            "SELECT committed_offset
             FROM queue_consumer_offset
             WHERE consumer_group = ? AND topic = ? AND partition_id = ?",
        )
        .bind(&self.consumer_group)
        .bind(&self.queue.topic)
        .bind(i64::from(self.queue.partition))
        .fetch_optional(&self.queue.pool)
        .await?;

        Ok(offset.map(QueueOffset))
    }

    async fn fetch_after(&self, position: i64) -> Result<Option<QueueMessage>, QueueError> {
        let row = sqlx::query(
            "SELECT message_offset, value, enqueued_at
             FROM queue_message
             WHERE topic = ? AND partition_id = ? AND message_offset > ?
             ORDER BY message_offset ASC
             LIMIT 1",
        )
        .bind(&self.queue.topic)
        .bind(i64::from(self.queue.partition))
        .bind(position)
        .fetch_optional(&self.queue.pool)
        .await?;

        row.map(message_from_row).transpose()
    }
}

#[async_trait]
impl QueueConsumer for SqlQueueConsumer {
    async fn next_message(&self) -> Result<QueueMessage, QueueError> {
        let mut position = self.position.lock().await;
        let start = match *position {
            Some(value) => value,
            None => self.committed_offset().await?.map(|offset| offset.0).unwrap_or(0),
        };
        *position = Some(start);

        loop {
            if let Some(message) = self.fetch_after(start).await? {
                *position = Some(message.offset.0);
                return Ok(message);
            }

            debug!(
                event_name = "queue.sql.poll_idle",
                topic = %self.queue.topic,
                partition = self.queue.partition,
                position = start,
                "no queued message yet; polling again"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn commit(&self, message: &QueueMessage) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO queue_consumer_offset (
                consumer_group,
                topic,
                partition_id,
                committed_offset,
                updated_at
             ) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(consumer_group, topic, partition_id) DO UPDATE SET
                committed_offset = excluded.committed_offset,
                updated_at = excluded.updated_at",
        )
        .bind(&self.consumer_group)
        .bind(&self.queue.topic)
        .bind(i64::from(self.queue.partition))
        .bind(message.offset.0)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.queue.pool)
        .await?;

        Ok(())
    }
}

fn message_from_row(row: SqliteRow) -> Result<QueueMessage, QueueError> {
    let offset: i64 = row.try_get("message_offset")?;
    let value: Vec<u8> = row.try_get("value")?;
    let enqueued_at: String = row.try_get("enqueued_at")?;
    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
        .map_err(|error| QueueError::Decode(format!("enqueued_at `{enqueued_at}`: {error}")))?
        .with_timezone(&Utc);

    Ok(QueueMessage { offset: QueueOffset(offset), value, enqueued_at })
}
