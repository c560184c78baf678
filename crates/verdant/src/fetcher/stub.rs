//! Deterministic synthetic scenes for environments without provider credentials

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use super::SceneFetcher;
use crate::error::FetchError;
use crate::indices::{clamp_index, evi_from_ndvi, ndwi_from_ndvi};
use crate::model::{Field, Metadata, VegetationScene};

pub const STUB_PROVIDER: &str = "Stub";

/// Same field and date always produce the same scene
#[derive(Debug, Clone, Copy, Default)]
pub struct StubSceneFetcher;

impl StubSceneFetcher {
  pub fn scene_for(field: &Field, date: DateTime<Utc>) -> Option<VegetationScene> {
    let coords = field.coordinates()?;
    let seed = (coords.latitude + coords.longitude + date.timestamp_millis() as f64).sin().abs();
    let ndvi = clamp_index(seed.fract() * 0.8 - 0.2);

    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), json!("stub"));

    Some(VegetationScene {
      provider: STUB_PROVIDER.to_string(),
      captured_at: date,
      ndvi,
      evi: Some(evi_from_ndvi(ndvi)),
      ndwi: Some(ndwi_from_ndvi(ndvi)),
      metadata,
      image: None,
    })
  }
}

#[async_trait]
impl SceneFetcher for StubSceneFetcher {
  fn provider(&self) -> &'static str {
    STUB_PROVIDER
  }

  async fn fetch(
    &self,
    field: &Field,
    date: DateTime<Utc>,
  ) -> Result<Option<VegetationScene>, FetchError> {
    Ok(Self::scene_for(field, date))
  }
}
