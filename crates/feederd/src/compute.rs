//! Compute-API collaborator, injected as a fake in tests. Launching an
//! EC2-style fleet is out of scope here; the logging stub is the
//! production stand-in until a concrete cloud driver is wired in.

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
    async fn launch_nodes(&self, count: u32) -> Result<(), ComputeError>;
}

/// Logs the launch decision instead of calling a real cloud API.
#[derive(Clone, Default)]
pub struct LoggingComputeApi;

#[async_trait]
impl ComputeApi for LoggingComputeApi {
    async fn launch_nodes(&self, count: u32) -> Result<(), ComputeError> {
        info!(count, "launching worker nodes");
        Ok(())
    }
}
