//! `POST /job/submit`.

use axum::extract::State;
use axum::Json;
use nommer_types::{Job, JobOptions, KNOWN_ENCODER_KINDS};
use serde::Deserialize;
use tracing::info;

use crate::error::SubmitError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub dest_path: Option<String>,
    #[serde(default)]
    pub notify_url: Option<String>,
    #[serde(default)]
    pub job_options: Option<SubmitJobOptions>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitJobOptions {
    #[serde(default)]
    pub nommer: Option<String>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

/// Fields required by this request, validated and unwrapped.
struct ValidSubmit {
    source_path: String,
    dest_path: String,
    nommer: String,
    options: serde_json::Value,
}

pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<serde_json::Value>, SubmitError> {
    let valid = validate(&req)?;

    let job = Job::new(
        valid.source_path,
        valid.dest_path,
        JobOptions {
            nommer: valid.nommer,
            options: valid.options,
        },
        req.notify_url,
    );

    state
        .job_store
        .put(&job)
        .await
        .map_err(|e| SubmitError::Internal(e.to_string()))?;

    state
        .new_job_queue
        .push(job.id.clone())
        .await
        .map_err(|e| SubmitError::Internal(e.to_string()))?;

    state.cache.update(job.clone()).await;

    info!(job_id = %job.id, source = %job.source_location, "job submitted");

    Ok(Json(serde_json::json!({
        "success": true,
        "job_id": job.id,
    })))
}

fn non_empty(value: Option<&str>, field: &str) -> Result<String, SubmitError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(SubmitError::InvalidRequest(field.to_string())),
    }
}

fn validate(req: &SubmitRequest) -> Result<ValidSubmit, SubmitError> {
    let source_path = non_empty(req.source_path.as_deref(), "source_path")?;
    let dest_path = non_empty(req.dest_path.as_deref(), "dest_path")?;

    let job_options = req
        .job_options
        .as_ref()
        .ok_or_else(|| SubmitError::InvalidRequest("job_options".to_string()))?;

    let nommer = non_empty(job_options.nommer.as_deref(), "job_options.nommer")?;
    if !KNOWN_ENCODER_KINDS.contains(&nommer.as_str()) {
        return Err(SubmitError::InvalidRequest(format!(
            "job_options.nommer: unknown encoder kind {:?}",
            nommer
        )));
    }

    let options = match &job_options.options {
        Some(serde_json::Value::Null) | None => {
            return Err(SubmitError::InvalidRequest("job_options.options".to_string()))
        }
        Some(v) => v.clone(),
    };

    Ok(ValidSubmit {
        source_path,
        dest_path,
        nommer,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> SubmitRequest {
        SubmitRequest {
            source_path: Some("mem://in/a".to_string()),
            dest_path: Some("mem://out/a".to_string()),
            notify_url: None,
            job_options: Some(SubmitJobOptions {
                nommer: Some("noop".to_string()),
                options: Some(serde_json::json!({})),
            }),
        }
    }

    #[test]
    fn rejects_empty_source_path() {
        let mut req = valid_request();
        req.source_path = Some("".to_string());
        assert!(matches!(validate(&req), Err(SubmitError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_missing_source_path() {
        let mut req = valid_request();
        req.source_path = None;
        assert!(matches!(validate(&req), Err(SubmitError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_missing_job_options() {
        let mut req = valid_request();
        req.job_options = None;
        assert!(matches!(validate(&req), Err(SubmitError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_unknown_encoder_kind() {
        let mut req = valid_request();
        req.job_options.as_mut().unwrap().nommer = Some("wmv-fax-machine".to_string());
        assert!(matches!(validate(&req), Err(SubmitError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_null_options() {
        let mut req = valid_request();
        req.job_options.as_mut().unwrap().options = Some(serde_json::Value::Null);
        assert!(matches!(validate(&req), Err(SubmitError::InvalidRequest(_))));
    }

    #[test]
    fn rejects_missing_options() {
        let mut req = valid_request();
        req.job_options.as_mut().unwrap().options = None;
        assert!(matches!(validate(&req), Err(SubmitError::InvalidRequest(_))));
    }

    #[test]
    fn accepts_well_formed_request() {
        assert!(validate(&valid_request()).is_ok());
    }
}
