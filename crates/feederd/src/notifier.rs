//! Callback notifier: fire-and-log, best-effort, never retried.

use nommer_types::Job;
use std::time::Duration;
use tracing::{info, warn};

const USER_AGENT: &str = "media-nommer feederd";
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(CALLBACK_TIMEOUT)
        .build()
        .expect("callback http client")
}

/// POST `{unique_id, job_state, job_state_details}` form-encoded to the
/// job's `notify_url`, if any. Response body is discarded; failures are
/// logged and not retried.
pub async fn send_notification(client: &reqwest::Client, job: &Job) {
    let Some(url) = job.notify_url.as_deref() else {
        return;
    };

    let detail = job.state_detail.clone().unwrap_or_default();
    let params = [
        ("unique_id", job.id.as_str()),
        ("job_state", job.state.as_str()),
        ("job_state_details", detail.as_str()),
    ];

    match client
        .post(url)
        .header("User-Agent", USER_AGENT)
        .form(&params)
        .send()
        .await
    {
        Ok(resp) => info!(job_id = %job.id, status = %resp.status(), "callback delivered"),
        Err(e) => warn!(job_id = %job.id, error = %e, "callback failed, not retried"),
    }
}
