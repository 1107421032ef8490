mod config;
mod errors;
mod llm_client;
mod proposal;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::OpenAiClient;
use crate::proposal::cache::ResponseCache;
use crate::proposal::rate_limiter::RateLimiter;
use crate::proposal::service::ProposalService;
use crate::proposal::templates::TemplateRegistry;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Proposal API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM gateway
    let gateway = Arc::new(OpenAiClient::new(config.openai_api_key.clone())?);
    info!("LLM gateway initialized (model: {})", config.openai.model);

    // Register built-in templates (fails fast on an invalid template)
    let registry = TemplateRegistry::builtin()?;
    info!("Template registry loaded");

    // Shared stateful services
    let limiter = RateLimiter::new(config.rate_limit.clone());
    let cache = ResponseCache::new(config.cache.clone());
    info!(
        "Rate limiting {} ({} req/min, {} tokens/min); cache {} (ttl {}m, max {} entries)",
        if config.rate_limit.enabled { "enabled" } else { "disabled" },
        config.rate_limit.max_requests_per_minute,
        config.rate_limit.max_tokens_per_minute,
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.ttl_minutes,
        config.cache.max_entries
    );

    let service = Arc::new(ProposalService::new(
        gateway,
        registry,
        limiter,
        cache,
        config.openai.clone(),
    ));

    let state = AppState { service };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
