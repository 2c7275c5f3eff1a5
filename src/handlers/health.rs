use axum::{Json, http::header, response::IntoResponse};

use crate::error::NO_CACHE;
use crate::models::iso_now;

// Liveness only, never touches the model
pub async fn health_handler() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, NO_CACHE)],
        Json(serde_json::json!({
            "status": "healthy",
            "timestamp": iso_now(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
