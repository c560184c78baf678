//! Server wiring and startup

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::fetcher::default_fetcher;
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::server::routing::create_router;
use crate::server::AppState;
use crate::store::PostgrestStore;

/// Build handler state backed by PostgREST and the configured scene provider
pub fn build_state(config: &Config) -> Result<AppState> {
  let store = Arc::new(PostgrestStore::from_config(&config.store).context("invalid store configuration")?);
  let fetcher = default_fetcher(&config.sentinel).context("failed to create scene fetcher")?;
  let pipeline =
    Pipeline::new(store.clone(), fetcher).with_settings(PipelineSettings::from(&config.pipeline));

  Ok(AppState { pipeline: Arc::new(pipeline), directory: store.clone(), auth: store })
}

/// Start the REST server
pub async fn start_server(addr: SocketAddr, state: AppState) -> Result<()> {
  tracing::info!(provider = state.pipeline.provider(), "starting verdant REST server on {addr}");

  let app = create_router(state).layer(
    ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()),
  );

  let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
  tracing::info!("server listening on {addr}");

  axum::serve(listener, app).await.context("server error")?;
  tracing::info!("server shut down");
  Ok(())
}
