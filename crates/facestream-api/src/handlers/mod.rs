//! HTTP and WebSocket handlers.

pub mod sessions;
pub mod status;
pub mod stream;

use axum::http::StatusCode;

use facestream_core::FacestreamConfig;
use facestream_services::FrameService;

#[derive(Clone)]
pub struct ApiState {
    pub service: FrameService,
    /// Largest WebSocket message accepted from a peer.
    pub max_message_size: usize,
    /// Whether the `/api` status routes are mounted.
    pub api_enabled: bool,
}

impl ApiState {
    pub fn new(service: FrameService, config: &FacestreamConfig) -> Self {
        Self {
            service,
            max_message_size: config.transfer.max_message_size,
            api_enabled: config.server.api_enabled,
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

const MAX_PEER_ID_LEN: usize = 128;

/// Validate a user id taken from a request path.
fn parse_peer_id(raw: &str) -> Result<&str, (StatusCode, String)> {
    if raw.is_empty() || raw.len() > MAX_PEER_ID_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("user id must be 1 to {MAX_PEER_ID_LEN} bytes"),
        ));
    }
    if raw.chars().any(char::is_control) {
        return Err((
            StatusCode::BAD_REQUEST,
            "user id must not contain control characters".to_string(),
        ));
    }
    Ok(raw)
}

pub use sessions::{handle_session_drop, handle_session_inspect};
pub use status::handle_status;
pub use stream::handle_stream;
