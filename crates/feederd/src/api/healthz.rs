//! Liveness probe. Ambient operational surface: it performs no JobStore
//! access.

use axum::Json;

pub async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
