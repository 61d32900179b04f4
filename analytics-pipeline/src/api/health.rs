//! Health Check API Handler

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health
/// Liveness probe; touches neither the store nor the permission service
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
