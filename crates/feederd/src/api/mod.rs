mod healthz;
mod submit;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/job/submit", post(submit::submit))
        .route("/healthz", get(healthz::healthz))
        .with_state(state)
}
