//! Sentinel Hub Process API fetcher
//!
//! Requests a single-band NDVI raster for a small box around the field center
//! and derives the scene's index values from it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::SceneFetcher;
use crate::config::SentinelConfig;
use crate::error::FetchError;
use crate::indices::{evi_from_ndvi, ndvi_from_raster, ndwi_from_ndvi};
use crate::model::{Bounds, Field, Metadata, VegetationScene};

pub const SENTINEL_PROVIDER: &str = "Sentinel";
const COLLECTION: &str = "sentinel-2-l2a";
const RASTER_SIZE: u32 = 512;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

const NDVI_EVALSCRIPT: &str = r#"//version=3
function setup() {
  return {
    input: ["B08", "B04"],
    output: {
      bands: 1,
      sampleType: "FLOAT32"
    }
  };
}

function evaluatePixel(sample) {
  const ndvi = (sample.B08 - sample.B04) / (sample.B08 + sample.B04 + 0.0000001);
  return [ndvi];
}
"#;

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
  token: String,
  expires_at: Instant,
}

impl CachedToken {
  fn is_fresh(&self) -> bool {
    self.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN
  }
}

#[derive(Debug, Clone)]
pub struct SentinelCredentials {
  pub client_id: String,
  pub client_secret: String,
  pub config_id: String,
}

pub struct SentinelHubFetcher {
  client: reqwest::Client,
  base_url: String,
  credentials: SentinelCredentials,
  bounds_delta: f64,
  token: Mutex<Option<CachedToken>>,
}

impl SentinelHubFetcher {
  pub fn new(
    base_url: impl Into<String>,
    credentials: SentinelCredentials,
    bounds_delta: f64,
  ) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder().user_agent("verdant-ingest").build()?;
    Ok(Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
      credentials,
      bounds_delta,
      token: Mutex::new(None),
    })
  }

  pub fn from_config(config: &SentinelConfig) -> Result<Self, FetchError> {
    if !config.is_configured() {
      return Err(FetchError::not_configured("client id, client secret and config id are required"));
    }
    let credentials = SentinelCredentials {
      client_id: config.client_id.clone().unwrap_or_default(),
      client_secret: config.client_secret.clone().unwrap_or_default(),
      config_id: config.config_id.clone().unwrap_or_default(),
    };
    Self::new(&config.base_url, credentials, config.bounds_delta)
  }

  /// Bearer token, refreshed shortly before it expires
  async fn access_token(&self) -> Result<String, FetchError> {
    let mut cached = self.token.lock().await;
    if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
      return Ok(token.token.clone());
    }

    let response = self
      .client
      .post(format!("{}/oauth/token", self.base_url))
      .form(&[
        ("grant_type", "client_credentials"),
        ("client_id", self.credentials.client_id.as_str()),
        ("client_secret", self.credentials.client_secret.as_str()),
      ])
      .send()
      .await?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
      let message = response.text().await.unwrap_or_default();
      return Err(FetchError::Auth { status: status.as_u16(), message });
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(FetchError::Http { status: status.as_u16(), body });
    }

    let body: TokenResponse = response
      .json()
      .await
      .map_err(|e| FetchError::malformed(format!("token response: {e}")))?;

    let ttl = Duration::from_secs(body.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));
    *cached = Some(CachedToken { token: body.access_token.clone(), expires_at: Instant::now() + ttl });
    Ok(body.access_token)
  }

  async fn request_ndvi_raster(
    &self,
    bounds: &Bounds,
    date: DateTime<Utc>,
  ) -> Result<Vec<u8>, FetchError> {
    let token = self.access_token().await?;
    let (from, to) = day_range(date);

    let body = json!({
      "input": {
        "bounds": { "bbox": bounds.bbox() },
        "data": [{
          "type": COLLECTION,
          "dataFilter": {
            "timeRange": { "from": from, "to": to },
            "mosaickingOrder": "mostRecent"
          }
        }]
      },
      "output": {
        "width": RASTER_SIZE,
        "height": RASTER_SIZE,
        "responses": [{ "identifier": "default", "format": { "type": "image/png" } }]
      },
      "evalscript": NDVI_EVALSCRIPT
    });

    let response = self
      .client
      .post(format!("{}/api/v1/process", self.base_url))
      .bearer_auth(&token)
      .header("X-INSTANCE-ID", &self.credentials.config_id)
      .json(&body)
      .send()
      .await?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
      // Token was revoked early; force a refresh next time.
      self.token.lock().await.take();
      let message = response.text().await.unwrap_or_default();
      return Err(FetchError::Auth { status: status.as_u16(), message });
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(FetchError::Http { status: status.as_u16(), body });
    }

    Ok(response.bytes().await?.to_vec())
  }
}

#[async_trait]
impl SceneFetcher for SentinelHubFetcher {
  fn provider(&self) -> &'static str {
    SENTINEL_PROVIDER
  }

  async fn fetch(
    &self,
    field: &Field,
    date: DateTime<Utc>,
  ) -> Result<Option<VegetationScene>, FetchError> {
    let Some(center) = field.coordinates() else {
      return Ok(None);
    };
    let bounds = Bounds::around(center, self.bounds_delta);

    let raster = self.request_ndvi_raster(&bounds, date).await?;
    if raster.is_empty() {
      tracing::debug!(field_id = %field.id, "Sentinel Hub returned an empty raster");
      return Ok(None);
    }

    let ndvi = ndvi_from_raster(&raster);
    let mut metadata = Metadata::new();
    metadata.insert("bounds".to_string(), json!(bounds));
    metadata.insert("collection".to_string(), json!(COLLECTION));

    Ok(Some(VegetationScene {
      provider: SENTINEL_PROVIDER.to_string(),
      captured_at: date,
      ndvi,
      evi: Some(evi_from_ndvi(ndvi)),
      ndwi: Some(ndwi_from_ndvi(ndvi)),
      metadata,
      image: Some(raster),
    }))
  }
}

/// From the target instant to the last millisecond of its UTC day
fn day_range(date: DateTime<Utc>) -> (String, String) {
  let end = date
    .date_naive()
    .and_hms_milli_opt(23, 59, 59, 999)
    .map(|naive| naive.and_utc())
    .unwrap_or(date);
  (
    date.to_rfc3339_opts(SecondsFormat::Millis, true),
    end.to_rfc3339_opts(SecondsFormat::Millis, true),
  )
}
