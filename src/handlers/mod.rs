mod health;
mod metrics;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::state::AppState;

pub use agent_test::{agent_test_get, agent_test_post};
pub use health::health_handler;
pub use metrics::metrics_handler;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/agent-test", get(agent_test_get).post(agent_test_post))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
