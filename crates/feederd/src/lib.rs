//! Controller process: job submission API, autoscaler, state-change
//! ingestion, stale-job sweeper, callback notifier.

pub mod api;
pub mod cache;
pub mod compute;
pub mod config;
pub mod controller;
pub mod error;
pub mod notifier;

use std::sync::Arc;

use cache::JobCache;
use nommer_queue::Queue;
use nommer_store::JobStore;

/// Shared state for the axum submit API. A stripped-down view of
/// [`controller::Controller`] — the API only ever creates jobs, it never
/// runs the background loops.
#[derive(Clone)]
pub struct AppState {
    pub job_store: Arc<dyn JobStore>,
    pub new_job_queue: Arc<dyn Queue>,
    pub cache: JobCache,
}
