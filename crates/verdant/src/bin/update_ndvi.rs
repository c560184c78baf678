//! Scheduled NDVI update job
//!
//! Loads every monitored field (or a single one) with the service key and
//! runs the ingestion pipeline for a target date.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use colored::*;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use verdant::config::Config;
use verdant::display::print_summary;
use verdant::fetcher::default_fetcher;
use verdant::model::FieldQuery;
use verdant::store::{FieldDirectory, PostgrestStore};
use verdant::{IngestRequest, Pipeline, PipelineSettings};

#[derive(Parser)]
#[command(name = "update_ndvi")]
#[command(about = "Fetch satellite scenes and record NDVI readings for monitored fields")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
  /// Only update this field
  #[arg(long)]
  field: Option<String>,

  /// Target date in RFC 3339 form; overrides --days
  #[arg(long)]
  date: Option<DateTime<Utc>>,

  /// Days before now to target when no --date is given
  #[arg(long, default_value_t = 3)]
  days: u32,

  /// Path to a YAML config file
  #[arg(long)]
  config: Option<PathBuf>,

  /// Maximum number of fields processed at once
  #[arg(long)]
  concurrency: Option<usize>,

  /// Enable verbose logging
  #[arg(short, long)]
  verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let filter = if args.verbose { EnvFilter::new("info") } else { EnvFilter::new("verdant=info,warn") };
  tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

  let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
  if let Some(concurrency) = args.concurrency {
    config.pipeline.concurrency = concurrency.max(1);
  }

  let date = args.date.unwrap_or_else(|| Utc::now() - Duration::days(i64::from(args.days)));
  tracing::info!(date = %date, field = ?args.field, "starting NDVI update job");

  let store = Arc::new(PostgrestStore::from_config(&config.store).context("invalid store configuration")?);
  let fields = store
    .list_fields(&FieldQuery::all().with_field(args.field.clone()))
    .await
    .context("failed to load fields")?;

  if fields.is_empty() {
    tracing::warn!("no fields to update");
    println!("{}", "No fields to update".yellow());
    return Ok(());
  }

  let fetcher = default_fetcher(&config.sentinel).context("failed to create scene fetcher")?;
  let pipeline = Pipeline::new(store, fetcher).with_settings(PipelineSettings::from(&config.pipeline));

  let summary = pipeline
    .run(IngestRequest::new(fields).with_date(date))
    .await
    .context("NDVI update failed")?;

  print_summary(&summary);
  Ok(())
}
