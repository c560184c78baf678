//! Verdant REST Server
//!
//! Serves the authenticated NDVI update endpoint.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use verdant::config::Config;
use verdant::server::startup::{build_state, start_server};

#[derive(Parser)]
#[command(name = "verdant_server")]
#[command(about = "Verdant NDVI REST API Server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
  /// Server bind address
  #[arg(long, default_value = "127.0.0.1:3000")]
  bind: SocketAddr,

  /// Path to a YAML config file
  #[arg(long)]
  config: Option<PathBuf>,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let filter = if args.verbose {
    EnvFilter::new("info,tower_http=debug")
  } else {
    EnvFilter::new("verdant=info,warn")
  };
  tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

  tracing::info!("Starting Verdant REST Server v{}", env!("CARGO_PKG_VERSION"));

  let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
  let state = build_state(&config)?;

  start_server(args.bind, state).await
}
