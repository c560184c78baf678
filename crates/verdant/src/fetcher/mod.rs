//! Scene fetcher abstraction over satellite imagery providers
//!
//! A fetcher answers one question: what does the provider see over this field
//! on this date? `Ok(None)` means "no usable coverage" and is a skip, not an
//! error. Deadlines are enforced by the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::SentinelConfig;
use crate::error::FetchError;
use crate::model::{Field, VegetationScene};

pub mod sentinel;
pub mod stub;

pub use sentinel::SentinelHubFetcher;
pub use stub::StubSceneFetcher;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneFetcher: Send + Sync {
  /// Provider name used in logs
  fn provider(&self) -> &'static str;

  /// Fetch the latest scene for `field` on `date`
  async fn fetch(
    &self,
    field: &Field,
    date: DateTime<Utc>,
  ) -> Result<Option<VegetationScene>, FetchError>;
}

/// Production fetcher for the given settings: Sentinel Hub when configured,
/// the deterministic stub otherwise.
pub fn default_fetcher(config: &SentinelConfig) -> Result<Arc<dyn SceneFetcher>, FetchError> {
  if config.is_configured() {
    tracing::info!(base_url = %config.base_url, "using Sentinel Hub scene fetcher");
    Ok(Arc::new(SentinelHubFetcher::from_config(config)?))
  } else {
    tracing::info!("Sentinel Hub disabled or not configured, using stub scene fetcher");
    Ok(Arc::new(StubSceneFetcher))
  }
}
