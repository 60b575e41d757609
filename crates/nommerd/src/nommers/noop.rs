//! Reference encoder used by tests and the happy-path scenario: it copies
//! the input to the output unchanged.

use std::path::Path;

use async_trait::async_trait;

use super::{Encoder, EncoderError};

#[derive(Debug, Default)]
pub struct NoopEncoder;

#[async_trait]
impl Encoder for NoopEncoder {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        _options: &serde_json::Value,
        _workdir: &Path,
    ) -> Result<(), EncoderError> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}
