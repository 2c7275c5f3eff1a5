use crate::auth::SessionVerifier;
use crate::gateway::AgentGateway;

// app's shared state, built once in main and handed to every handler
pub struct AppState {
    pub gateway: AgentGateway,
    pub sessions: SessionVerifier,
}

impl AppState {
    // Caller id for the request, None when the session is missing or invalid
    pub fn caller_id(&self, headers: &axum::http::HeaderMap) -> Option<String> {
        match self.sessions.caller_id(headers) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::debug!(error = %err, "session not accepted");
                None
            }
        }
    }
}
