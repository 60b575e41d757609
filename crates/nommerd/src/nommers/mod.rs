//! Encoder registry: `encoder_kind -> factory function`, populated once at
//! startup. Unknown kinds are rejected at submit time by feederd, not here.

mod ffmpeg;
mod noop;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use ffmpeg::FfmpegEncoder;
pub use noop::NoopEncoder;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder exited with failure: {0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A pluggable strategy that turns a downloaded source file into an output
/// file.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &serde_json::Value,
        workdir: &Path,
    ) -> Result<(), EncoderError>;
}

#[derive(Clone, Default)]
pub struct EncoderRegistry {
    encoders: HashMap<String, Arc<dyn Encoder>>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, encoder: Arc<dyn Encoder>) {
        self.encoders.insert(kind.into(), encoder);
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn Encoder>> {
        self.encoders.get(kind).cloned()
    }
}

/// The registry shipped by this worker, covering every kind in
/// [`nommer_types::KNOWN_ENCODER_KINDS`].
pub fn default_registry() -> EncoderRegistry {
    let mut registry = EncoderRegistry::new();
    registry.register("noop", Arc::new(NoopEncoder));
    registry.register("ffmpeg", Arc::new(FfmpegEncoder::default()));
    registry
}
