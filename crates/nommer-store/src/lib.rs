//! JobStore / NodeStore adapters: durable, string-attribute key-value
//! stores keyed by job/node id. An in-memory implementation backs tests and
//! local development; the optional `sqlite` feature backs real deployments.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nommer_types::{Job, JobState, Node, NodeState};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job or node {0} not found")]
    NotFound(String),

    #[error("transient store error: {0}")]
    Transient(String),

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Durable job record store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create-or-update. Returns the job's id.
    async fn put(&self, job: &Job) -> Result<String, StoreError>;

    async fn get(&self, id: &str) -> Result<Job, StoreError>;

    /// Rows whose state is not in the terminal set. Malformed rows are
    /// logged and skipped rather than failing the whole scan.
    async fn list_active(&self) -> Result<Vec<Job>, StoreError>;

    /// Drop the entire table. A "does not exist" response is success.
    async fn wipe(&self) -> Result<(), StoreError>;
}

/// Durable worker heartbeat store.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn put(&self, node: &Node) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Node, StoreError>;

    /// Nodes currently reporting `ACTIVE`.
    async fn list_active(&self) -> Result<Vec<Node>, StoreError>;
}

/// In-process `JobStore`, used by tests and the local (non-cloud) deployment mode.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    rows: Arc<RwLock<HashMap<String, Job>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: &Job) -> Result<String, StoreError> {
        let mut rows = self.rows.write().await;
        // A terminal job is never mutated again by the system; re-saving it
        // is tolerated as a no-op rather than an error, since duplicate
        // writes from a race (ABANDONED vs a late worker write) must be
        // idempotent.
        if let Some(existing) = rows.get(&job.id) {
            if existing.state.is_terminal() {
                return Ok(job.id.clone());
            }
        }
        rows.insert(job.id.clone(), job.clone());
        Ok(job.id.clone())
    }

    async fn get(&self, id: &str) -> Result<Job, StoreError> {
        self.rows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|j| j.state.is_active())
            .cloned()
            .collect())
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        self.rows.write().await.clear();
        Ok(())
    }
}

/// In-process `NodeStore`.
#[derive(Clone, Default)]
pub struct InMemoryNodeStore {
    rows: Arc<RwLock<HashMap<String, Node>>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn put(&self, node: &Node) -> Result<(), StoreError> {
        self.rows.write().await.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Node, StoreError> {
        self.rows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|n| n.state == NodeState::Active)
            .cloned()
            .collect())
    }
}
