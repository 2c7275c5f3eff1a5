mod auth;
mod config;
mod error;
mod gateway;
mod handlers;
mod metrics;
mod models;
mod rate_limit;
mod state;
mod vertex;

use anyhow::Context;
use clap::Parser; // for cli
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::auth::SessionVerifier;
use crate::config::{Args, VertexConfig};
use crate::gateway::AgentGateway;
use crate::rate_limit::{RateLimiter, sweeper};
use crate::state::AppState;
use crate::vertex::{AgentService, Credentials, TokenSource, VertexClient};

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments, config errors stop the process here
    let args = Args::parse();
    let vertex_config = args.vertex_config()?;
    let sessions = SessionVerifier::from_key(args.session_key()?)?;

    let service = build_agent_service(&args, &vertex_config)?;
    let limiter = Arc::new(RateLimiter::new(args.rate_limit, args.rate_window()));

    // spawn the sweeper so idle callers don't pile up forever
    tokio::spawn(sweeper(Arc::clone(&limiter), args.sweep_interval()));

    let state = Arc::new(AppState {
        gateway: AgentGateway::new(limiter, service),
        sessions,
    });
    let initialized = state.gateway.service().is_initialized();
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(port = args.port, "agent gateway running on http://localhost:{}", args.port);
    tracing::info!(
        project_id = %vertex_config.project_id,
        location = %vertex_config.location,
        model = %vertex_config.model,
        endpoint = %vertex_config.endpoint,
        initialized,
        "forwarding to Vertex AI"
    );
    tracing::info!(
        "Rate limit: {} requests per {} seconds",
        args.rate_limit, args.rate_window
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

// Bad credential material degrades the service instead of aborting startup
fn build_agent_service(args: &Args, config: &VertexConfig) -> anyhow::Result<AgentService> {
    let credentials = match Credentials::resolve(
        args.credentials_json.as_deref(),
        args.credentials_path.as_deref(),
    ) {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize Vertex AI client");
            return Ok(AgentService::uninitialized(config, e.to_string()));
        }
    };

    tracing::info!(source = credentials.kind(), "Google credentials loaded");
    let token_http = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .context("failed to build token client")?;
    let tokens = TokenSource::new(credentials, token_http);
    let client = VertexClient::new(config, tokens)?;

    Ok(AgentService::new(config, Arc::new(client)))
}
