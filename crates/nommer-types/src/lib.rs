//! Job and node record types shared by feederd and nommerd.
//!
//! This crate owns the state machine's DAG validation and the id/truncation
//! rules that every storage backend and queue consumer must agree on.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Attribute-store string length limit for free-form detail fields.
pub const STATE_DETAIL_MAX_LEN: usize = 1023;

/// Length (in hex chars) a generated job id is truncated to.
const JOB_ID_LEN: usize = 48;

/// Encoder kinds recognized at job-submit time; unknown kinds fail at
/// submit, not at execute. The controller validates against this list
/// without depending on the worker's concrete encoder implementations.
pub const KNOWN_ENCODER_KINDS: &[&str] = &["noop", "ffmpeg"];

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("job {0} is terminal and cannot be mutated further")]
    TerminalMutation(String),

    #[error("unknown job state {0:?}")]
    UnknownState(String),
}

/// The seven states a job can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Downloading,
    Encoding,
    Uploading,
    Finished,
    Error,
    Abandoned,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Error | JobState::Abandoned)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` is a legal edge in the state DAG.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Error => true,
            Abandoned => true,
            Downloading => self == Pending,
            Encoding => self == Downloading,
            Uploading => self == Encoding,
            Finished => self == Uploading,
            Pending => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Downloading => "DOWNLOADING",
            JobState::Encoding => "ENCODING",
            JobState::Uploading => "UPLOADING",
            JobState::Finished => "FINISHED",
            JobState::Error => "ERROR",
            JobState::Abandoned => "ABANDONED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "DOWNLOADING" => Ok(JobState::Downloading),
            "ENCODING" => Ok(JobState::Encoding),
            "UPLOADING" => Ok(JobState::Uploading),
            "FINISHED" => Ok(JobState::Finished),
            "ERROR" => Ok(JobState::Error),
            "ABANDONED" => Ok(JobState::Abandoned),
            other => Err(TypesError::UnknownState(other.to_string())),
        }
    }
}

/// Encoder-specific job options. `options` is kept opaque (serialized JSON)
/// since its shape is defined by whichever `nommer` is named.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    pub nommer: String,
    pub options: serde_json::Value,
}

/// A single transcoding request and its durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source_location: String,
    pub dest_location: String,
    pub encoder_kind: String,
    pub options: serde_json::Value,
    pub state: JobState,
    pub state_detail: Option<String>,
    pub notify_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Construct a new job in `PENDING`, generating its id from the request
    /// contents plus a random salt (SHA-256, truncated to 48 hex chars).
    pub fn new(
        source_location: String,
        dest_location: String,
        job_options: JobOptions,
        notify_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let id = generate_job_id(&source_location, &dest_location, &job_options.options);
        Job {
            id,
            source_location,
            dest_location,
            encoder_kind: job_options.nommer,
            options: job_options.options,
            state: JobState::Pending,
            state_detail: None,
            notify_url,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attempt a state transition, validating against the DAG and bumping
    /// `updated_at`. A terminal job refuses every further transition.
    pub fn transition_to(
        &mut self,
        next: JobState,
        detail: Option<String>,
    ) -> Result<(), TypesError> {
        if self.state.is_terminal() {
            return Err(TypesError::TerminalMutation(self.id.clone()));
        }
        if !self.state.can_transition_to(next) {
            return Err(TypesError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.state_detail = detail.map(|d| truncate_tail(&d, STATE_DETAIL_MAX_LEN));
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Force a terminal `ABANDONED` transition. Idempotent: abandoning an
    /// already-terminal job is a no-op rather than an error.
    pub fn force_abandon(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::Abandoned;
        self.updated_at = Utc::now();
    }

    pub fn inactive_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

/// SHA-256 of source || dest || canonical(options) || random salt, hex
/// encoded and truncated to `JOB_ID_LEN` chars. Falls within the spec's
/// 40-64 char id window.
pub fn generate_job_id(source: &str, dest: &str, options: &serde_json::Value) -> String {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    generate_job_id_with_salt(source, dest, options, &salt)
}

fn generate_job_id_with_salt(
    source: &str,
    dest: &str,
    options: &serde_json::Value,
    salt: &[u8],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(dest.as_bytes());
    hasher.update(options.to_string().as_bytes());
    hasher.update(salt);
    let digest = hasher.finalize();
    hex::encode(digest)[..JOB_ID_LEN].to_string()
}

/// Keep the *tail* of `s` when it exceeds `max_len`: the actionable part of
/// an encoder error is usually in the last few lines.
pub fn truncate_tail(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    chars[chars.len() - max_len..].iter().collect()
}

/// Worker node heartbeat state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Active,
    Terminated,
}

impl NodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Active => "ACTIVE",
            NodeState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker heartbeat record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub active_jobs: u32,
    pub state: NodeState,
    pub last_report_at: DateTime<Utc>,
}

impl Node {
    pub fn new(id: String) -> Self {
        Node {
            id,
            active_jobs: 0,
            state: NodeState::Active,
            last_report_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_advances_through_happy_path() {
        let mut job = Job::new(
            "mem://in/a".into(),
            "mem://out/a".into(),
            JobOptions {
                nommer: "noop".into(),
                options: serde_json::json!({}),
            },
            None,
        );
        assert_eq!(job.state, JobState::Pending);
        job.transition_to(JobState::Downloading, None).unwrap();
        job.transition_to(JobState::Encoding, None).unwrap();
        job.transition_to(JobState::Uploading, None).unwrap();
        job.transition_to(JobState::Finished, None).unwrap();
        assert_eq!(job.state, JobState::Finished);
    }

    #[test]
    fn error_reachable_from_any_active_state() {
        for start in [
            JobState::Pending,
            JobState::Downloading,
            JobState::Encoding,
            JobState::Uploading,
        ] {
            assert!(start.can_transition_to(JobState::Error));
        }
    }

    #[test]
    fn terminal_job_rejects_further_transitions() {
        let mut job = Job::new(
            "mem://in/a".into(),
            "mem://out/a".into(),
            JobOptions {
                nommer: "noop".into(),
                options: serde_json::json!({}),
            },
            None,
        );
        job.transition_to(JobState::Error, Some("boom".into())).unwrap();
        let result = job.transition_to(JobState::Downloading, None);
        assert!(matches!(result, Err(TypesError::TerminalMutation(_))));
    }

    #[test]
    fn invalid_jump_is_rejected() {
        let mut job = Job::new(
            "mem://in/a".into(),
            "mem://out/a".into(),
            JobOptions {
                nommer: "noop".into(),
                options: serde_json::json!({}),
            },
            None,
        );
        let result = job.transition_to(JobState::Uploading, None);
        assert!(matches!(result, Err(TypesError::InvalidTransition { .. })));
    }

    #[test]
    fn state_detail_keeps_tail_when_truncated() {
        let long = "a".repeat(2000) + "bad opts";
        let truncated = truncate_tail(&long, STATE_DETAIL_MAX_LEN);
        assert_eq!(truncated.len(), STATE_DETAIL_MAX_LEN);
        assert!(truncated.ends_with("bad opts"));
    }

    #[test]
    fn job_ids_are_unique_across_calls() {
        let opts = serde_json::json!({});
        let a = generate_job_id("mem://in/a", "mem://out/a", &opts);
        let b = generate_job_id("mem://in/a", "mem://out/a", &opts);
        assert_ne!(a, b, "random salt should make repeated calls distinct");
        assert_eq!(a.len(), JOB_ID_LEN);
    }

    #[test]
    fn force_abandon_is_idempotent_on_terminal_jobs() {
        let mut job = Job::new(
            "mem://in/a".into(),
            "mem://out/a".into(),
            JobOptions {
                nommer: "noop".into(),
                options: serde_json::json!({}),
            },
            None,
        );
        job.transition_to(JobState::Error, None).unwrap();
        job.force_abandon();
        assert_eq!(job.state, JobState::Error, "already-terminal jobs stay put");
    }
}
