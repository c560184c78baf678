//! HTTP surface for triggering NDVI updates
//!
//! Uses axum for routing; tower-http supplies tracing and CORS layers.

pub mod handlers;
pub mod routing;
pub mod startup;
pub mod types;

use std::sync::Arc;

use crate::pipeline::Pipeline;
use crate::store::{Authenticator, FieldDirectory};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
  pub pipeline: Arc<Pipeline>,
  pub directory: Arc<dyn FieldDirectory>,
  pub auth: Arc<dyn Authenticator>,
}
