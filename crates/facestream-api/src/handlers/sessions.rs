//! /sessions handlers: session inspection and management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{parse_peer_id, ApiState};

// ── /sessions/{peer} (DELETE) ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionDropResponse {
    pub peer: String,
    pub dropped: bool,
}

pub async fn handle_session_drop(
    State(state): State<ApiState>,
    Path(peer): Path<String>,
) -> Result<Json<SessionDropResponse>, (StatusCode, String)> {
    let id = parse_peer_id(&peer)?;
    let dropped = state.service.sessions().remove(id).is_some();

    if dropped {
        state.service.reassembler().discard_peer(id);
        tracing::info!(peer = %peer, "session dropped via API");
    }

    Ok(Json(SessionDropResponse { peer, dropped }))
}

// ── /sessions/{peer} (GET) ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionInspectResponse {
    pub peer: String,
    pub connection_id: u64,
    pub uptime_secs: u64,
    pub pending_frames: usize,
}

pub async fn handle_session_inspect(
    State(state): State<ApiState>,
    Path(peer): Path<String>,
) -> Result<Json<SessionInspectResponse>, (StatusCode, String)> {
    let id = parse_peer_id(&peer)?;

    let handle = state
        .service
        .sessions()
        .get(id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))?;

    Ok(Json(SessionInspectResponse {
        pending_frames: state.service.reassembler().in_progress(id),
        connection_id: handle.connection_id(),
        uptime_secs: handle.established_at().elapsed().as_secs(),
        peer,
    }))
}
