//! turnloop HTTP Server
//!
//! Axum-based server exposing the persona assistant over a stateless REST API.
//! Clients send the transcript they got back from the previous turn.

mod handlers;
mod state;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use persona_assistant::{DEFAULT_PERSONA_NAME, DEFAULT_PROFILE_DIR, Profile, notifier_from_env, register_tools};
use turnloop_core::{Agent, AgentConfig, LlmEvaluator, LlmProvider, ReviewedAgent, ToolRegistry};
use turnloop_runtime::{OpenAiConfig, OpenAiProvider};

use crate::handlers::{chat_handler, health_check, list_models, list_tools};
use crate::state::AppState;

/// Build the router
pub(crate) fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))
        .route("/api/tools", get(list_tools))
        // Agent API
        .route("/api/chat", post(chat_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Evaluator on its own endpoint, if `EVALUATOR_MODEL` is set
fn evaluator_from_env(chat: &OpenAiConfig, profile: &Profile) -> anyhow::Result<Option<LlmEvaluator>> {
    let Ok(model) = std::env::var("EVALUATOR_MODEL") else {
        return Ok(None);
    };

    let config = OpenAiConfig {
        name: "Evaluator".into(),
        ..OpenAiConfig::from_env_prefixed("EVALUATOR", chat)
    };
    tracing::info!("✓ Evaluator enabled: {} at {}", model, config.base_url);

    let provider = OpenAiProvider::new(config).context("evaluator provider")?;
    Ok(Some(LlmEvaluator::new(
        Arc::new(provider),
        profile.evaluator_prompt(),
        model,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize LLM provider
    let chat_config = OpenAiConfig::from_env();
    let provider = Arc::new(OpenAiProvider::new(chat_config.clone()).context("chat provider")?);

    match provider.health_check().await {
        Ok(true) => {
            tracing::info!("✓ Connected to {}", chat_config.base_url);
        }
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not reachable - chat requests will fail", chat_config.base_url);
            tracing::warn!("  Check OPENAI_BASE_URL and OPENAI_API_KEY");
        }
    }

    // Load the persona
    let profile_dir = std::env::var("PROFILE_DIR").unwrap_or_else(|_| DEFAULT_PROFILE_DIR.into());
    let persona = std::env::var("PERSONA_NAME").unwrap_or_else(|_| DEFAULT_PERSONA_NAME.into());
    let profile = Profile::load(&profile_dir, persona)
        .with_context(|| format!("loading profile from '{}'", profile_dir))?;

    // Initialize tools
    let notifier = notifier_from_env().context("notifier")?;
    let mut tools = ToolRegistry::new();
    register_tools(&mut tools, notifier)?;

    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    // Build the agent
    let config = AgentConfig {
        system_prompt: profile.system_prompt(),
        ..AgentConfig::from_env()
    };
    tracing::info!(
        model = %config.generation.model,
        max_tool_rounds = config.max_tool_rounds,
        "Speaking as {}",
        profile.name
    );
    let agent = Arc::new(Agent::new(provider, Arc::new(tools), config));

    let mut state = AppState::new(Arc::clone(&agent));
    if let Some(evaluator) = evaluator_from_env(&chat_config, &profile)? {
        state = state.with_reviewer(Arc::new(ReviewedAgent::new(agent, Arc::new(evaluator))));
    }

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 turnloop server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health     - Health check");
    tracing::info!("  GET  /api/models - List available models");
    tracing::info!("  GET  /api/tools  - List registered tools");
    tracing::info!("  POST /api/chat   - Send message");
    tracing::info!("");

    axum::serve(listener, app(state)).await?;

    Ok(())
}
