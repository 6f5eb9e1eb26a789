//! HTTP API gateway for Taconite.
//!
//! Exposes the session registry over REST: health, conversation management,
//! and chat turns with batch or SSE-streamed replies.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, extract::State, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use taconite_chat::ResponseAssembler;
use taconite_config::AppConfig;
use taconite_core::estimator::CharRatioEstimator;
use taconite_core::registry::{SessionRegistry, SessionSpec};
use taconite_core::session::{DEFAULT_SESSION_NAME, SessionId};
use taconite_core::transcript::{EvictionNotice, EvictionObserver};
use taconite_providers::OllamaGateway;

pub use api_v1::{ApiV1State, SessionDefaults, SharedApiState};

/// Build the full router: `/health` plus the v1 API.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Logs evictions instead of printing them; the server has no terminal.
struct LogEvictions;

impl EvictionObserver for LogEvictions {
    fn on_evicted(&self, notice: &EvictionNotice) {
        info!(
            conversation = %notice.session_id,
            role = %notice.removed_role,
            preview = %notice.content_preview,
            tokens_freed = notice.tokens_freed,
            "Trimmed old message"
        );
    }
}

/// Build the shared API state from configuration.
pub fn state_from_config(config: &AppConfig) -> Result<SharedApiState, Box<dyn std::error::Error>> {
    let gateway = Arc::new(OllamaGateway::from_config(&config.inference)?);

    let registry = SessionRegistry::new(
        SessionSpec::new(
            SessionId::default_session(),
            DEFAULT_SESSION_NAME,
            config.model.clone(),
            config.system_prompt.clone(),
            config.max_tokens,
        ),
        Arc::new(CharRatioEstimator::new(config.chars_per_token)),
        Some(Arc::new(LogEvictions)),
    );

    let assembler = ResponseAssembler::new(gateway);

    Ok(Arc::new(ApiV1State::new(
        registry,
        assembler,
        SessionDefaults {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        },
    )))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = state_from_config(&config)?;
    let app = build_router(state);

    info!(
        addr = %addr,
        model = %config.model,
        inference = %config.inference.host,
        "Gateway starting with v1 API"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    model: String,
    inference_reachable: bool,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    let inference_reachable = state
        .assembler
        .gateway()
        .health_check()
        .await
        .unwrap_or(false);

    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        model: state.defaults.model.clone(),
        inference_reachable,
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}
