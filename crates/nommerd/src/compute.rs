//! Compute-API collaborator, injected as a fake in tests. Terminating a
//! cloud instance out from under itself is out of scope here; the logging
//! stub is the production stand-in until a concrete cloud driver is wired
//! in.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("transient compute API error: {0}")]
    Transient(String),
}

#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn terminate_node(&self, node_id: &str) -> Result<(), ComputeError>;
}

/// Logs the termination decision instead of calling a real cloud API.
#[derive(Clone, Default)]
pub struct LoggingComputeApi;

#[async_trait]
impl ComputeApi for LoggingComputeApi {
    async fn terminate_node(&self, node_id: &str) -> Result<(), ComputeError> {
        info!(node_id, "terminating idle worker node");
        Ok(())
    }
}
