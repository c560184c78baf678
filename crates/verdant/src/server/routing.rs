//! Axum router configuration

use axum::{
  routing::{get, post},
  Router,
};

use crate::server::handlers::{ndvi, status};
use crate::server::AppState;

/// Create the application router with shared state
pub fn create_router(state: AppState) -> Router {
  Router::new()
    .route("/status", get(status::status))
    .route("/api/ndvi/update", post(ndvi::update_ndvi))
    .with_state(state)
}
