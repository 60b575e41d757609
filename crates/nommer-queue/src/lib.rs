//! NewJobQueue / StateChangeQueue abstraction.
//!
//! Both queues carry the same wire shape (a raw job id string) and the same
//! delete-on-pop contract: once a message is popped it is gone, and the job
//! record itself — not the queue — is the source of truth.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

/// Underlying queue services cap a single receive call at this many messages.
pub const MAX_POP_BATCH: usize = 10;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("requested batch size {0} exceeds the underlying queue limit of {MAX_POP_BATCH}")]
    BatchTooLarge(usize),

    #[error("transient queue error: {0}")]
    Transient(String),
}

/// A durable, at-least-once FIFO queue of job ids.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn push(&self, job_id: String) -> Result<(), QueueError>;

    /// Pop up to `max` ids (max 10), deleting them immediately. May return
    /// duplicate ids if the same id was pushed more than once; callers are
    /// responsible for deduplicating before acting (see [`dedup_preserve_order`]).
    async fn pop_batch(&self, max: usize) -> Result<Vec<String>, QueueError>;
}

/// In-process queue backed by a `VecDeque`, used for local development, the
/// encoding-pipeline test harness, and the "local" (non-cloud) deployment mode.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn push(&self, job_id: String) -> Result<(), QueueError> {
        self.inner.lock().await.push_back(job_id);
        Ok(())
    }

    async fn pop_batch(&self, max: usize) -> Result<Vec<String>, QueueError> {
        if max > MAX_POP_BATCH {
            return Err(QueueError::BatchTooLarge(max));
        }
        let mut guard = self.inner.lock().await;
        let n = max.min(guard.len());
        Ok(guard.drain(..n).collect())
    }
}

/// Deduplicate a popped batch, keeping first-seen order, so that a consumer
/// performs exactly `distinct(ids)` downstream reads per batch.
pub fn dedup_preserve_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pop_batch_respects_cap() {
        let q = InMemoryQueue::new();
        for i in 0..15 {
            q.push(format!("job-{i}")).await.unwrap();
        }
        let popped = q.pop_batch(10).await.unwrap();
        assert_eq!(popped.len(), 10);
        assert_eq!(q.len().await, 5);
    }

    #[tokio::test]
    async fn pop_batch_rejects_oversized_request() {
        let q = InMemoryQueue::new();
        let err = q.pop_batch(11).await.unwrap_err();
        assert!(matches!(err, QueueError::BatchTooLarge(11)));
    }

    #[tokio::test]
    async fn popped_messages_are_gone() {
        let q = InMemoryQueue::new();
        q.push("job-1".into()).await.unwrap();
        let first = q.pop_batch(10).await.unwrap();
        assert_eq!(first, vec!["job-1".to_string()]);
        let second = q.pop_batch(10).await.unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string(), "c".to_string()];
        assert_eq!(dedup_preserve_order(ids), vec!["a", "b", "c"]);
    }
}
