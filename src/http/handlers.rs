use super::state::AppState;
use crate::call::{CallSession, CallStats};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    /// Optional call ID (if not provided, generate UUID)
    pub call_id: Option<String>,

    /// Optional voice override for this call
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartCallResponse {
    pub call_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopCallResponse {
    pub call_id: String,
    pub status: String,
    pub message: String,
    pub stats: CallStats,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
    pub call_id: String,
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /calls
/// Open a live session and start streaming the microphone into it
pub async fn start_call(
    State(state): State<AppState>,
    Json(req): Json<StartCallRequest>,
) -> impl IntoResponse {
    // Generate or use provided call ID
    let call_id = req
        .call_id
        .unwrap_or_else(|| format!("call-{}", uuid::Uuid::new_v4()));

    info!("Starting call: {}", call_id);

    // Check if the ID is already in use
    {
        let calls = state.calls.read().await;
        if calls.contains_key(&call_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Call {} is already active", call_id),
                }),
            )
                .into_response();
        }
    }

    // Per-call config with any request overrides applied
    let mut config = (*state.config).clone();
    if let Some(voice) = req.voice {
        config.live.voice = voice;
    }

    if let Err(e) = config.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Invalid configuration: {}", e),
            }),
        )
            .into_response();
    }

    // Connect the live session
    let session = match CallSession::connect_with_id(call_id.clone(), &config).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to connect call: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to connect call: {}", e),
                }),
            )
                .into_response();
        }
    };

    // Wait for the open confirmation and wire up capture
    if let Err(e) = session.start().await {
        error!("Failed to start call: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to start call: {}", e),
            }),
        )
            .into_response();
    }

    // Store session
    {
        let mut calls = state.calls.write().await;
        calls.insert(call_id.clone(), session);
    }

    info!("Call started successfully: {}", call_id);

    (
        StatusCode::OK,
        Json(StartCallResponse {
            call_id: call_id.clone(),
            status: "active".to_string(),
            message: format!("Call {} started", call_id),
        }),
    )
        .into_response()
}

/// POST /calls/:call_id/stop
/// End a call and return its final stats
pub async fn stop_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping call: {}", call_id);

    // Find and remove session
    let session = {
        let mut calls = state.calls.write().await;
        calls.remove(&call_id)
    };

    match session {
        Some(session) => match session.stop().await {
            Ok(stats) => {
                info!("Call stopped successfully: {}", call_id);
                (
                    StatusCode::OK,
                    Json(StopCallResponse {
                        call_id: call_id.clone(),
                        status: "stopped".to_string(),
                        message: "Call ended".to_string(),
                        stats,
                    }),
                )
                    .into_response()
            }
            Err(e) => {
                error!("Failed to stop call: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to stop call: {}", e),
                    }),
                )
                    .into_response()
            }
        },
        None => {
            error!("Call {} not found", call_id);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Call {} not found", call_id),
                }),
            )
                .into_response()
        }
    }
}

/// PUT /calls/:call_id/mute
/// Gate or ungate the transmit side (capture keeps running either way)
pub async fn set_mute(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<MuteRequest>,
) -> impl IntoResponse {
    let calls = state.calls.read().await;

    match calls.get(&call_id) {
        Some(session) => {
            session.set_muted(req.muted);
            info!("Call {} muted: {}", call_id, req.muted);
            (
                StatusCode::OK,
                Json(MuteResponse {
                    call_id: call_id.clone(),
                    muted: req.muted,
                }),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Call {} not found", call_id),
            }),
        )
            .into_response(),
    }
}

/// GET /calls/:call_id
/// Get the current status of a call
pub async fn get_call_status(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> impl IntoResponse {
    let calls = state.calls.read().await;

    match calls.get(&call_id) {
        Some(session) => (StatusCode::OK, Json(session.stats())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Call {} not found", call_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
