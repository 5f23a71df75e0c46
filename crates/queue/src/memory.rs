use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};

use crate::{QueueConsumer, QueueError, QueueMessage, QueueOffset, QueueProducer};

/// Process-local queue with one logical stream and one consumer.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<MemoryState>,
    notify: Notify,
}

#[derive(Default)]
struct MemoryState {
    log: Vec<QueueMessage>,
    position: usize,
    committed: Option<QueueOffset>,
    closed: bool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes reads fail once the remaining messages are drained.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_one();
    }

    /// Moves the read position back to just after the last commit, the way a
    /// restarted consumer would resume.
    pub async fn rewind_to_committed(&self) {
        let mut state = self.state.lock().await;
        state.position = state.committed.map(|offset| offset.0 as usize + 1).unwrap_or(0);
        self.notify.notify_one();
    }

    pub async fn published(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.log.iter().map(|message| message.value.clone()).collect()
    }

    pub async fn committed_offset(&self) -> Option<QueueOffset> {
        self.state.lock().await.committed
    }
}

#[async_trait]
impl QueueProducer for InMemoryQueue {
    async fn publish(&self, value: Vec<u8>) -> Result<QueueOffset, QueueError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed);
        }

        let offset = QueueOffset(state.log.len() as i64);
        state.log.push(QueueMessage { offset, value, enqueued_at: Utc::now() });
        drop(state);

        self.notify.notify_one();
        Ok(offset)
    }
}

#[async_trait]
impl QueueConsumer for InMemoryQueue {
    async fn next_message(&self) -> Result<QueueMessage, QueueError> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(message) = state.log.get(state.position).cloned() {
                    state.position += 1;
                    return Ok(message);
                }
                if state.closed {
                    return Err(QueueError::Closed);
                }
            }

            // `notify_one` stores a permit when nobody is waiting yet.
            self.notify.notified().await;
        }
    }

    async fn commit(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.committed.map_or(true, |committed| committed < message.offset) {
            state.committed = Some(message.offset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::{InMemoryQueue, QueueConsumer, QueueError, QueueOffset, QueueProducer};

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = InMemoryQueue::new();
        for value in ["1", "2", "3"] {
            queue.publish(value.as_bytes().to_vec()).await.expect("publish");
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(queue.next_message().await.expect("read").value);
        }
        assert_eq!(seen, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
    }

    #[tokio::test]
    async fn reader_wakes_when_message_is_published() {
        let queue = Arc::new(InMemoryQueue::new());
        let reader = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next_message().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.publish(b"wake".to_vec()).await.expect("publish");

        let message = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("reader should wake")
            .expect("join")
            .expect("read");
        assert_eq!(message.value, b"wake");
    }

    #[tokio::test]
    async fn concurrent_publishers_each_get_a_distinct_offset() {
        let queue = Arc::new(InMemoryQueue::new());
        let mut handles = Vec::new();
        for index in 0..16u8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move { queue.publish(vec![index]).await }));
        }

        let mut offsets = Vec::new();
        for handle in handles {
            offsets.push(handle.await.expect("join").expect("publish"));
        }
        offsets.sort();
        offsets.dedup();
        assert_eq!(offsets.len(), 16);
        assert_eq!(queue.published().await.len(), 16);
    }

    #[tokio::test]
    async fn closed_queue_fails_reads_after_drain() {
        let queue = InMemoryQueue::new();
        queue.publish(b"last".to_vec()).await.expect("publish");
        queue.close().await;

        assert_eq!(queue.next_message().await.expect("read").value, b"last");
        assert!(matches!(queue.next_message().await, Err(QueueError::Closed)));
        assert!(matches!(queue.publish(b"late".to_vec()).await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn rewind_replays_uncommitted_messages() {
        let queue = InMemoryQueue::new();
        queue.publish(b"a".to_vec()).await.expect("publish");
        queue.publish(b"b".to_vec()).await.expect("publish");

        let first = queue.next_message().await.expect("read");
        queue.commit(&first).await.expect("commit");
        let _second = queue.next_message().await.expect("read");

        queue.rewind_to_committed().await;
        assert_eq!(queue.next_message().await.expect("read").value, b"b");
        assert_eq!(queue.committed_offset().await, Some(QueueOffset(0)));
    }
}
