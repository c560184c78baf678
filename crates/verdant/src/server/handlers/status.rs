//! Health endpoint

use axum::{extract::State, response::Json};

use crate::server::types::StatusResponse;
use crate::server::AppState;

/// GET /status - Health check endpoint
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
  Json(StatusResponse {
    status: "healthy".to_string(),
    version: env!("CARGO_PKG_VERSION").to_string(),
    provider: state.pipeline.provider().to_string(),
  })
}
