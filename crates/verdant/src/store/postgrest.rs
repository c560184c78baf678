//! Supabase/PostgREST adapter for the store traits

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{Authenticator, FieldDirectory, IngestStore};
use crate::config::StoreConfig;
use crate::error::{ConfigError, StoreError};
use crate::model::{Field, FieldCacheUpdate, FieldQuery, NewSatelliteImage, NewVegetationIndex};

const IMAGES_TABLE: &str = "satellite_images";
const INDICES_TABLE: &str = "ndvi_indices";
const FIELDS_TABLE: &str = "fields";
// Owner-scoped listings filter on the farm, so they need an inner join.
// Unscoped listings keep fields without a farm so they surface as skips.
const OWNED_FIELD_SELECT: &str = "id,latitude,longitude,farms!inner(owner_id)";
const ALL_FIELD_SELECT: &str = "id,latitude,longitude,farms!fields_farm_id_fkey(owner_id)";

#[derive(Debug, Deserialize)]
struct FieldRow {
  id: String,
  latitude: Option<f64>,
  longitude: Option<f64>,
  farms: Option<FarmRef>,
}

#[derive(Debug, Deserialize)]
struct FarmRef {
  owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
  id: String,
}

pub struct PostgrestStore {
  client: reqwest::Client,
  base_url: String,
  service_key: String,
}

impl PostgrestStore {
  pub fn new(base_url: &str, service_key: impl Into<String>) -> Result<Self, ConfigError> {
    Url::parse(base_url).map_err(|_| ConfigError::invalid_value("store.url", base_url))?;
    let client = reqwest::Client::builder()
      .user_agent("verdant-ingest")
      .build()
      .map_err(|e| ConfigError::invalid_value("store client", e.to_string()))?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      service_key: service_key.into(),
    })
  }

  pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
    let url = config.url.as_deref().ok_or_else(|| ConfigError::missing("SUPABASE_URL"))?;
    let key =
      config.service_key.clone().ok_or_else(|| ConfigError::missing("SUPABASE_SERVICE_ROLE_KEY"))?;
    Self::new(url, key)
  }

  fn table_url(&self, table: &str) -> String {
    format!("{}/rest/v1/{table}", self.base_url)
  }

  fn with_service_auth(&self, builder: RequestBuilder) -> RequestBuilder {
    builder.header("apikey", &self.service_key).bearer_auth(&self.service_key)
  }

  async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::rejected(status.as_u16(), message))
  }
}

/// PostgREST returns generated ids as strings (uuid) or numbers (serial)
fn extract_id(rows: &[serde_json::Value]) -> Option<String> {
  match rows.first()?.get("id")? {
    serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
    serde_json::Value::Number(id) => Some(id.to_string()),
    _ => None,
  }
}

#[async_trait]
impl IngestStore for PostgrestStore {
  async fn ping(&self) -> Result<(), StoreError> {
    let response = self
      .with_service_auth(self.client.get(format!("{}/rest/v1/", self.base_url)))
      .send()
      .await
      .map_err(|e| StoreError::unavailable(e.to_string()))?;

    if !response.status().is_success() {
      return Err(StoreError::unavailable(format!("health check returned {}", response.status())));
    }
    Ok(())
  }

  async fn insert_image(&self, image: &NewSatelliteImage) -> Result<String, StoreError> {
    let response = self
      .with_service_auth(self.client.post(self.table_url(IMAGES_TABLE)))
      .header("Prefer", "return=representation")
      .json(image)
      .send()
      .await?;
    let response = Self::ensure_success(response).await?;

    let rows: Vec<serde_json::Value> = response
      .json()
      .await
      .map_err(|e| StoreError::decode(format!("satellite image insert response: {e}")))?;
    extract_id(&rows).ok_or(StoreError::MissingId)
  }

  async fn insert_index(&self, index: &NewVegetationIndex) -> Result<(), StoreError> {
    let response = self
      .with_service_auth(self.client.post(self.table_url(INDICES_TABLE)))
      .header("Prefer", "return=minimal")
      .json(index)
      .send()
      .await?;
    Self::ensure_success(response).await?;
    Ok(())
  }

  async fn update_field_cache(
    &self,
    field_id: &str,
    update: &FieldCacheUpdate,
  ) -> Result<(), StoreError> {
    let response = self
      .with_service_auth(self.client.patch(self.table_url(FIELDS_TABLE)))
      .query(&[("id", format!("eq.{field_id}"))])
      .header("Prefer", "return=minimal")
      .json(update)
      .send()
      .await?;
    Self::ensure_success(response).await?;
    Ok(())
  }

  async fn discard_image(&self, image_id: &str) -> Result<(), StoreError> {
    let response = self
      .with_service_auth(self.client.delete(self.table_url(IMAGES_TABLE)))
      .query(&[("id", format!("eq.{image_id}"))])
      .send()
      .await?;
    Self::ensure_success(response).await?;
    Ok(())
  }
}

#[async_trait]
impl FieldDirectory for PostgrestStore {
  async fn list_fields(&self, query: &FieldQuery) -> Result<Vec<Field>, StoreError> {
    let mut params = match &query.owner_id {
      Some(owner_id) => vec![
        ("select", OWNED_FIELD_SELECT.to_string()),
        ("farms.owner_id", format!("eq.{owner_id}")),
      ],
      None => vec![("select", ALL_FIELD_SELECT.to_string())],
    };
    if let Some(field_id) = &query.field_id {
      params.push(("id", format!("eq.{field_id}")));
    }

    let response = self
      .with_service_auth(self.client.get(self.table_url(FIELDS_TABLE)))
      .query(&params)
      .send()
      .await?;
    let response = Self::ensure_success(response).await?;

    let rows: Vec<FieldRow> = response
      .json()
      .await
      .map_err(|e| StoreError::decode(format!("field listing response: {e}")))?;

    Ok(
      rows
        .into_iter()
        .map(|row| Field {
          id: row.id,
          owner_id: query.owner_id.clone().or_else(|| row.farms.and_then(|farm| farm.owner_id)),
          latitude: row.latitude,
          longitude: row.longitude,
        })
        .collect(),
    )
  }
}

#[async_trait]
impl Authenticator for PostgrestStore {
  async fn resolve_user(&self, access_token: &str) -> Result<Option<String>, StoreError> {
    let response = self
      .client
      .get(format!("{}/auth/v1/user", self.base_url))
      .header("apikey", &self.service_key)
      .bearer_auth(access_token)
      .send()
      .await?;

    if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
      return Ok(None);
    }
    let response = Self::ensure_success(response).await?;
    let user: AuthUser =
      response.json().await.map_err(|e| StoreError::decode(format!("auth user response: {e}")))?;
    Ok(Some(user.id))
  }
}
