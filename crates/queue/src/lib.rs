//! Queue client seam and the bundled queue implementations.
//!
//! The bridge talks to its queue through two traits: [`QueueProducer`] for
//! writes from the chat-event path and [`QueueConsumer`] for the single
//! consumer loop. Both sides agree on one topic and one partition, so the
//! consumer sees messages in publish order.
//!
//! - [`SqlQueue`] - durable log stored in SQLite through `sqlx`
//! - [`InMemoryQueue`] - process-local queue for tests and local runs
//! - [`EnvelopeProducer`] - encodes a correlation envelope and publishes it

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod connection;
pub mod memory;
pub mod migrations;
pub mod producer;
pub mod sql;

pub use connection::{connect_with_settings, QueuePool};
pub use memory::InMemoryQueue;
pub use producer::EnvelopeProducer;
pub use sql::{SqlQueue, SqlQueueConsumer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueOffset(pub i64);

impl std::fmt::Display for QueueOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
    pub offset: QueueOffset,
    pub value: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("queue decode error: {0}")]
    Decode(String),
    #[error("queue is closed")]
    Closed,
}

#[async_trait]
pub trait QueueProducer: Send + Sync {
    /// Appends one message. Safe to call from concurrent tasks.
    async fn publish(&self, value: Vec<u8>) -> Result<QueueOffset, QueueError>;
}

#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Waits for the next message after the consumer's position.
    async fn next_message(&self) -> Result<QueueMessage, QueueError>;

    /// Records `message` as handled so a restarted consumer resumes after it.
    async fn commit(&self, message: &QueueMessage) -> Result<(), QueueError>;
}
