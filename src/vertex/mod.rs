//! Vertex AI access: credentials, the HTTP model client and the agent service
//! built on top of it.

mod client;
mod credentials;
mod service;
mod types;

use async_trait::async_trait;

use crate::error::UpstreamError;

pub use client::VertexClient;
pub use credentials::{Credentials, TokenSource};
pub use service::{AgentService, NOT_INITIALIZED};
pub use types::GenerateContentResponse;

/// The single operation the gateway needs from a generative model backend.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<GenerateContentResponse, UpstreamError>;
}
