//! /status handler.

use axum::extract::State;
use axum::Json;

use facestream_services::ServiceStatus;

use super::ApiState;

pub async fn handle_status(State(state): State<ApiState>) -> Json<ServiceStatus> {
    Json(state.service.status())
}
