use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::time::Duration;

use crate::rate_limit::describe_window;

pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Fatal startup errors. Nothing else is allowed to abort the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GOOGLE_CLOUD_PROJECT_ID is required for Vertex AI")]
    MissingProjectId,

    #[error("a session verification key is required (CLERK_JWT_KEY or SESSION_JWT_SECRET)")]
    MissingSessionKey,

    #[error("invalid session verification key: {0}")]
    InvalidSessionKey(#[source] jsonwebtoken::errors::Error),

    #[error("invalid upstream client configuration: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Problems with the Google credential material. These leave the agent
/// service uninitialized instead of stopping the server.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("could not read credentials file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credentials JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid service account private key: {0}")]
    PrivateKey(#[source] jsonwebtoken::errors::Error),
}

/// Failures talking to the generative model backend.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vertex AI API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("token request failed: {0}")]
    Token(String),

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not sign token assertion: {0}")]
    Assertion(#[from] jsonwebtoken::errors::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Session token verification failures. All of them surface as a plain 401.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no session token presented")]
    MissingToken,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("session token has no subject")]
    MissingSubject,

    #[error("invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Per-request rejections raised before the model is ever called.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Authentication required")]
    Authentication,

    #[error("Rate limit exceeded")]
    RateLimited {
        limit: u32,
        window: Duration,
        retry_after: Option<Duration>,
    },

    #[error("{0}")]
    Validation(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Authentication => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            GatewayError::RateLimited { limit, window, .. } => serde_json::json!({
                "error": self.to_string(),
                "message": format!(
                    "Maximum {} requests per {} allowed",
                    limit,
                    describe_window(*window)
                ),
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));

        if let GatewayError::RateLimited {
            retry_after: Some(wait),
            ..
        } = self
        {
            // round up so clients never retry inside the old window
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }

        response
    }
}
