//! The `ffmpeg` encoder: an opaque external subprocess, not a transcoder
//! reimplemented in Rust. Multi-pass options are a list of pass-option
//! bundles; each pass gets its own fresh working directory because ffmpeg
//! writes side-files with fixed names.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use nommer_types::truncate_tail;
use serde_json::{Map, Value};
use tracing::debug;

use super::{Encoder, EncoderError};

const STDERR_TAIL_LEN: usize = 1023;

#[derive(Debug)]
pub struct FfmpegEncoder {
    program: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        FfmpegEncoder {
            program: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PassOptions {
    infile_options: Map<String, Value>,
    outfile_options: Map<String, Value>,
}

fn as_pass(bundle: &Value) -> PassOptions {
    PassOptions {
        infile_options: bundle
            .get("infile_options")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        outfile_options: bundle
            .get("outfile_options")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

fn extract_passes(options: &Value) -> Vec<PassOptions> {
    match options.get("passes").and_then(Value::as_array) {
        Some(bundles) => bundles.iter().map(as_pass).collect(),
        None => vec![as_pass(options)],
    }
}

fn flatten(options: &Map<String, Value>) -> Vec<String> {
    let mut flags = Vec::with_capacity(options.len() * 2);
    for (key, value) in options {
        flags.push(format!("-{key}"));
        flags.push(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }
    flags
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &Value,
        workdir: &Path,
    ) -> Result<(), EncoderError> {
        let passes = extract_passes(options);
        let last = passes.len().saturating_sub(1);

        for (i, pass) in passes.iter().enumerate() {
            let pass_dir = workdir.join(format!("pass-{i}"));
            tokio::fs::create_dir_all(&pass_dir).await?;

            let pass_output: PathBuf = if i == last {
                output.to_path_buf()
            } else {
                pass_dir.join("intermediate.out")
            };

            self.run_one_pass(input, &pass_output, pass, &pass_dir).await?;
        }

        Ok(())
    }
}

impl FfmpegEncoder {
    async fn run_one_pass(
        &self,
        input: &Path,
        output: &Path,
        pass: &PassOptions,
        pass_dir: &Path,
    ) -> Result<(), EncoderError> {
        let mut args = flatten(&pass.infile_options);
        args.push("-i".to_string());
        args.push(input.display().to_string());
        args.extend(flatten(&pass.outfile_options));
        args.push(output.display().to_string());

        debug!(program = %self.program, ?args, dir = %pass_dir.display(), "invoking encoder pass");

        let child = tokio::process::Command::new(&self.program)
            .args(&args)
            .current_dir(pass_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let result = child.wait_with_output().await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(EncoderError::Failed(truncate_tail(&stderr, STDERR_TAIL_LEN)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pass_falls_back_to_flat_options() {
        let options = serde_json::json!({
            "infile_options": {"ss": "00:00:01"},
            "outfile_options": {"vcodec": "libx264"},
        });
        let passes = extract_passes(&options);
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].infile_options.get("ss").unwrap(), "00:00:01");
    }

    #[test]
    fn multi_pass_list_is_preserved_in_order() {
        let options = serde_json::json!({
            "passes": [
                {"outfile_options": {"pass": "1"}},
                {"outfile_options": {"pass": "2"}},
            ]
        });
        let passes = extract_passes(&options);
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[1].outfile_options.get("pass").unwrap(), "2");
    }

    #[test]
    fn flatten_emits_dash_prefixed_pairs() {
        let mut map = Map::new();
        map.insert("vcodec".to_string(), Value::String("libx264".to_string()));
        let flags = flatten(&map);
        assert_eq!(flags, vec!["-vcodec".to_string(), "libx264".to_string()]);
    }
}
