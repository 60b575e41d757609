//! Controller error taxonomy's HTTP-facing half.

use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("missing or empty required field: {0}")]
    InvalidRequest(String),

    #[error("transient failure: {0}")]
    Internal(String),
}

/// `InvalidRequest` never changes HTTP status: the failure is communicated
/// in the JSON envelope (`{success:false, message}`), matching the contract
/// callers of this API already expect.
impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        Json(serde_json::json!({
            "success": false,
            "message": message,
        }))
        .into_response()
    }
}
