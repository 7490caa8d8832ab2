//! REST API server for the voice ledger assistant
//!
//! Speech recognition and playback happen in the browser. The server
//! receives the final transcript, runs the turn, and returns what should be
//! shown and spoken.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::intent::candidate_from_directive;
use crate::models::ApplyOutcome;
use crate::session::{AssistantServices, AssistantSession, TurnKind, TurnState};
use crate::speech::{RecordingSynthesizer, TranscriptCapture};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TurnRequest {
    pub user_id: Option<String>,
    pub utterance: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceTransactionRequest {
    pub user_id: Option<String>,
    pub action: serde_json::Value,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TurnResponse {
    turn_id: uuid::Uuid,
    kind: TurnKind,
    display_text: String,
    spoken_text: Vec<String>,
    refresh_requested: bool,
    confirmation: Option<crate::models::Confirmation>,
    transitions: Vec<TurnState>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub services: AssistantServices,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Assistant Turn Endpoint
/// =============================

async fn run_turn(
    State(state): State<ApiState>,
    Json(req): Json<TurnRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(user_id = ?req.user_id, "Received assistant turn");

    let synthesizer = Arc::new(RecordingSynthesizer::new());
    let session = AssistantSession::new(
        state.services.clone(),
        req.user_id.filter(|id| !id.trim().is_empty()),
        Arc::new(TranscriptCapture::new(req.utterance)),
        synthesizer.clone(),
    );

    match session.run_turn().await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::success(TurnResponse {
                turn_id: outcome.turn_id,
                kind: outcome.kind,
                display_text: outcome.display_text,
                spoken_text: synthesizer.spoken(),
                refresh_requested: outcome.refresh_requested,
                confirmation: outcome.confirmation,
                transitions: outcome.transitions,
            })),
        ),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::error(format!("Turn rejected: {}", e))),
        ),
    }
}

/// =============================
/// Direct Transaction Endpoint
/// =============================

async fn apply_voice_transaction(
    State(state): State<ApiState>,
    Json(req): Json<VoiceTransactionRequest>,
) -> (StatusCode, Json<ApplyOutcome>) {
    let Some(candidate) = candidate_from_directive(&req.action) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApplyOutcome::failure(
                "Action is not a create_transaction directive".to_string(),
            )),
        );
    };

    let outcome = state
        .services
        .applicator
        .apply_outcome(req.user_id.as_deref(), &candidate)
        .await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    (status, Json(outcome))
}

/// =============================
/// Turn History Endpoint
/// =============================

async fn list_turns(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.services.audit.list_for_identity(&user_id).await {
        Ok(records) => (StatusCode::OK, Json(ApiResponse::success(records))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Failed to list turns: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(services: AssistantServices) -> Router {
    let state = ApiState { services };

    Router::new()
        .route("/health", get(health))
        .route("/api/assistant/turn", post(run_turn))
        .route("/api/assistant/turns/:user_id", get(list_turns))
        .route("/api/transactions/voice", post(apply_voice_transaction))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    services: AssistantServices,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(services);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
