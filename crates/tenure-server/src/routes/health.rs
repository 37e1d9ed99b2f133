use axum::Json;

/// GET /health: liveness only; answers as long as the process is serving.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
