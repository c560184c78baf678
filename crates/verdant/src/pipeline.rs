//! Vegetation-index ingestion pipeline
//!
//! For every field in a batch:
//! 1. skip when coordinates (or the owner) are missing
//! 2. fetch a scene under a deadline; no scene is a skip, an error a failure
//! 3. write the satellite image row
//! 4. write the index row linked to that image (discarding the image if this fails)
//! 5. refresh the field's cached reading, best-effort
//!
//! Fields run concurrently on a bounded set of tokio tasks. Each field's own
//! steps are strictly sequential, and every outcome is folded into a single
//! `BatchSummary`. Only a store that is unreachable before the batch starts
//! makes `run` return an error.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::PipelineConfig;
use crate::error::{FetchError, FieldError, IngestError, PersistStage};
use crate::fetcher::SceneFetcher;
use crate::model::{
  Field, FieldCacheUpdate, NewSatelliteImage, NewVegetationIndex, VegetationScene,
};
use crate::store::IngestStore;

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
  /// Upper bound on fields processed at once
  pub concurrency: usize,
  /// Deadline for a single scene fetch
  pub fetch_timeout: Duration,
}

impl Default for PipelineSettings {
  fn default() -> Self {
    PipelineSettings::from(&PipelineConfig::default())
  }
}

impl From<&PipelineConfig> for PipelineSettings {
  fn from(config: &PipelineConfig) -> Self {
    Self { concurrency: config.concurrency.max(1), fetch_timeout: config.fetch_timeout() }
  }
}

/// One pipeline invocation
pub struct IngestRequest {
  pub fields: Vec<Field>,
  /// Overrides the pipeline's default fetcher for this run
  pub scene_fetcher: Option<Arc<dyn SceneFetcher>>,
  /// Target date; defaults to now
  pub date: Option<DateTime<Utc>>,
}

impl IngestRequest {
  pub fn new(fields: Vec<Field>) -> Self {
    Self { fields, scene_fetcher: None, date: None }
  }

  pub fn with_fetcher(mut self, fetcher: Arc<dyn SceneFetcher>) -> Self {
    self.scene_fetcher = Some(fetcher);
    self
  }

  pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
    self.date = Some(date);
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
  Inserted,
  Skipped,
  Failed,
}

/// Outcome for a single field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReport {
  pub field_id: String,
  pub status: FieldStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
}

impl FieldReport {
  fn inserted(field_id: String, warning: Option<String>) -> Self {
    Self { field_id, status: FieldStatus::Inserted, reason: None, error: None, warning }
  }

  fn from_error(field_id: String, err: &FieldError) -> Self {
    let (status, error) = if err.is_skip() {
      (FieldStatus::Skipped, None)
    } else {
      (FieldStatus::Failed, Some(err.to_string()))
    };
    Self { field_id, status, reason: Some(err.reason().to_string()), error, warning: None }
  }

  fn panicked(field_id: String, message: String) -> Self {
    Self {
      field_id,
      status: FieldStatus::Failed,
      reason: Some("WORKER_PANIC".to_string()),
      error: Some(message),
      warning: None,
    }
  }
}

/// Aggregate result of one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
  pub processed: usize,
  pub inserted: usize,
  pub skipped: usize,
  pub failed: usize,
  pub details: Vec<FieldReport>,
}

impl BatchSummary {
  fn record(&mut self, report: FieldReport) {
    self.processed += 1;
    match report.status {
      FieldStatus::Inserted => self.inserted += 1,
      FieldStatus::Skipped => self.skipped += 1,
      FieldStatus::Failed => self.failed += 1,
    }
    self.details.push(report);
  }

  pub fn report_for(&self, field_id: &str) -> Option<&FieldReport> {
    self.details.iter().find(|report| report.field_id == field_id)
  }
}

#[derive(Clone)]
pub struct Pipeline {
  store: Arc<dyn IngestStore>,
  fetcher: Arc<dyn SceneFetcher>,
  settings: PipelineSettings,
}

impl Pipeline {
  pub fn new(store: Arc<dyn IngestStore>, fetcher: Arc<dyn SceneFetcher>) -> Self {
    Self { store, fetcher, settings: PipelineSettings::default() }
  }

  pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
    self.settings = settings;
    self
  }

  pub fn settings(&self) -> &PipelineSettings {
    &self.settings
  }

  /// Provider name of the default scene fetcher
  pub fn provider(&self) -> &'static str {
    self.fetcher.provider()
  }

  pub async fn run(&self, request: IngestRequest) -> Result<BatchSummary, IngestError> {
    self.store.ping().await.map_err(IngestError::StoreUnavailable)?;

    let date = request.date.unwrap_or_else(Utc::now);
    let worker = Arc::new(FieldWorker {
      store: self.store.clone(),
      fetcher: request.scene_fetcher.unwrap_or_else(|| self.fetcher.clone()),
      fetch_timeout: self.settings.fetch_timeout,
      date,
    });
    let limiter = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));

    tracing::info!(
      fields = request.fields.len(),
      date = %date,
      concurrency = self.settings.concurrency,
      "starting NDVI ingestion batch"
    );

    let tasks = request.fields.into_iter().map(|field| {
      let field_id = field.id.clone();
      let worker = worker.clone();
      let limiter = limiter.clone();
      let handle = tokio::spawn(async move {
        let _permit = limiter.acquire_owned().await.ok();
        worker.process(field).await
      });
      async move { (field_id, handle.await) }
    });

    let mut summary = BatchSummary::default();
    for (field_id, joined) in join_all(tasks).await {
      let report = match joined {
        Ok(report) => report,
        Err(e) => {
          tracing::error!(field_id = %field_id, error = %e, "field worker panicked");
          FieldReport::panicked(field_id, e.to_string())
        }
      };
      summary.record(report);
    }

    tracing::info!(
      processed = summary.processed,
      inserted = summary.inserted,
      skipped = summary.skipped,
      failed = summary.failed,
      "NDVI ingestion batch completed"
    );
    Ok(summary)
  }
}

struct FieldWorker {
  store: Arc<dyn IngestStore>,
  fetcher: Arc<dyn SceneFetcher>,
  fetch_timeout: Duration,
  date: DateTime<Utc>,
}

impl FieldWorker {
  async fn process(&self, field: Field) -> FieldReport {
    match self.ingest(&field).await {
      Ok(warning) => {
        tracing::debug!(field_id = %field.id, "field ingested");
        FieldReport::inserted(field.id, warning)
      }
      Err(err) if err.is_skip() => {
        tracing::debug!(field_id = %field.id, reason = err.reason(), "field skipped");
        FieldReport::from_error(field.id, &err)
      }
      Err(err) => {
        tracing::warn!(field_id = %field.id, reason = err.reason(), error = %err, "field failed");
        FieldReport::from_error(field.id, &err)
      }
    }
  }

  /// Returns a cache-update warning on success, if there was one
  async fn ingest(&self, field: &Field) -> Result<Option<String>, FieldError> {
    if field.coordinates().is_none() {
      return Err(FieldError::CoordinatesMissing);
    }
    let owner_id = field.owner_id.as_deref().ok_or(FieldError::OwnerMissing)?;

    let scene = self.fetch_scene(field).await?;

    let image = image_record(field, owner_id, &scene);
    let image_id = self
      .store
      .insert_image(&image)
      .await
      .map_err(|source| FieldError::PersistenceFailure { stage: PersistStage::Image, source })?;

    let index = index_record(field, owner_id, &image_id, &scene);
    if let Err(source) = self.store.insert_index(&index).await {
      self.discard_orphan(&field.id, &image_id).await;
      return Err(FieldError::PersistenceFailure { stage: PersistStage::Index, source });
    }

    let cache = FieldCacheUpdate { last_ndvi: scene.ndvi, last_reading_at: scene.captured_at };
    match self.store.update_field_cache(&field.id, &cache).await {
      Ok(()) => Ok(None),
      Err(e) => {
        tracing::warn!(field_id = %field.id, error = %e, "field cache update failed");
        Ok(Some(format!("field cache update failed: {e}")))
      }
    }
  }

  async fn fetch_scene(&self, field: &Field) -> Result<VegetationScene, FieldError> {
    match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(field, self.date)).await {
      Ok(Ok(Some(scene))) => Ok(scene),
      Ok(Ok(None)) => Err(FieldError::NoSceneAvailable),
      Ok(Err(e)) => Err(FieldError::FetchFailure(e)),
      Err(_) => Err(FieldError::FetchFailure(FetchError::Timeout(self.fetch_timeout))),
    }
  }

  async fn discard_orphan(&self, field_id: &str, image_id: &str) {
    if let Err(e) = self.store.discard_image(image_id).await {
      tracing::warn!(
        field_id = %field_id,
        image_id = %image_id,
        error = %e,
        "could not discard orphaned satellite image"
      );
    }
  }
}

fn image_record(field: &Field, owner_id: &str, scene: &VegetationScene) -> NewSatelliteImage {
  NewSatelliteImage {
    field_id: field.id.clone(),
    user_id: owner_id.to_string(),
    provider: scene.provider.clone(),
    captured_at: scene.captured_at,
    image_url: scene.image.as_deref().map(png_data_url),
    file_path: None,
    band_data: scene.metadata.clone(),
  }
}

fn index_record(
  field: &Field,
  owner_id: &str,
  image_id: &str,
  scene: &VegetationScene,
) -> NewVegetationIndex {
  NewVegetationIndex {
    field_id: field.id.clone(),
    image_id: image_id.to_string(),
    user_id: owner_id.to_string(),
    provider: scene.provider.clone(),
    ndvi_value: scene.ndvi,
    evi_value: scene.evi,
    ndwi_value: scene.ndwi,
    computed_at: scene.captured_at,
  }
}

/// Inline `data:` URL used as the stored image reference
pub fn png_data_url(raster: &[u8]) -> String {
  format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(raster))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::StoreError;
  use crate::fetcher::MockSceneFetcher;
  use crate::model::Metadata;
  use crate::store::MockIngestStore;
  use chrono::TimeZone;
  use serde_json::json;

  fn target_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
  }

  fn scene(date: DateTime<Utc>) -> VegetationScene {
    let mut metadata = Metadata::new();
    metadata.insert("mock".to_string(), json!(true));
    VegetationScene {
      provider: "Sentinel".to_string(),
      captured_at: date,
      ndvi: 0.45,
      evi: Some(0.5),
      ndwi: Some(0.2),
      metadata,
      image: Some(vec![1, 2, 3]),
    }
  }

  fn fetcher_with_scene() -> MockSceneFetcher {
    let mut fetcher = MockSceneFetcher::new();
    fetcher.expect_fetch().returning(|_, date| Ok(Some(scene(date))));
    fetcher
  }

  fn reachable_store() -> MockIngestStore {
    let mut store = MockIngestStore::new();
    store.expect_ping().returning(|| Ok(()));
    store
  }

  fn pipeline(store: MockIngestStore, fetcher: MockSceneFetcher) -> Pipeline {
    Pipeline::new(Arc::new(store), Arc::new(fetcher))
  }

  #[test]
  fn test_png_data_url() {
    assert_eq!(png_data_url(&[1, 2, 3]), "data:image/png;base64,AQID");
  }

  #[tokio::test]
  async fn test_writes_image_then_linked_index_then_cache() {
    let mut store = reachable_store();
    store
      .expect_insert_image()
      .withf(|image| {
        image.field_id == "field-1"
          && image.user_id == "user-1"
          && image.image_url.as_deref() == Some("data:image/png;base64,AQID")
          && image.band_data.get("mock") == Some(&json!(true))
      })
      .times(1)
      .returning(|_| Ok("img-1".to_string()));
    store
      .expect_insert_index()
      .withf(|index| index.image_id == "img-1" && index.ndvi_value == 0.45 && index.evi_value == Some(0.5))
      .times(1)
      .returning(|_| Ok(()));
    store
      .expect_update_field_cache()
      .withf(|field_id, _| field_id.to_string() == "field-1")
      .times(1)
      .returning(|_, _| Ok(()));
    store.expect_discard_image().never();

    let summary = pipeline(store, fetcher_with_scene())
      .run(IngestRequest::new(vec![Field::new("field-1", "user-1", 30.1, 31.2)]).with_date(target_date()))
      .await
      .unwrap();

    assert_eq!((summary.inserted, summary.skipped, summary.failed), (1, 0, 0));
    assert_eq!(summary.details[0].status, FieldStatus::Inserted);
    assert!(summary.details[0].warning.is_none());
  }

  #[tokio::test]
  async fn test_image_failure_never_attempts_index() {
    let mut store = reachable_store();
    store.expect_insert_image().times(1).returning(|_| Err(StoreError::rejected(500, "insert failed")));
    store.expect_insert_index().never();
    store.expect_update_field_cache().never();

    let summary = pipeline(store, fetcher_with_scene())
      .run(IngestRequest::new(vec![Field::new("field-1", "user-1", 30.0, 31.0)]))
      .await
      .unwrap();

    assert_eq!((summary.inserted, summary.skipped, summary.failed), (0, 0, 1));
    let report = summary.report_for("field-1").unwrap();
    assert_eq!(report.reason.as_deref(), Some("IMAGE_PERSISTENCE_ERROR"));
    assert!(report.error.as_deref().unwrap().contains("insert failed"));
  }

  #[tokio::test]
  async fn test_missing_image_id_is_failure() {
    let mut store = reachable_store();
    store.expect_insert_image().returning(|_| Err(StoreError::MissingId));
    store.expect_insert_index().never();

    let summary = pipeline(store, fetcher_with_scene())
      .run(IngestRequest::new(vec![Field::new("field-1", "user-1", 30.0, 31.0)]))
      .await
      .unwrap();

    assert_eq!(summary.failed, 1);
  }

  #[tokio::test]
  async fn test_index_failure_discards_orphan_image() {
    let mut store = reachable_store();
    store.expect_insert_image().returning(|_| Ok("img-7".to_string()));
    store.expect_insert_index().returning(|_| Err(StoreError::rejected(400, "bad index")));
    store.expect_discard_image().withf(|id| id.to_string() == "img-7").times(1).returning(|_| Ok(()));
    store.expect_update_field_cache().never();

    let summary = pipeline(store, fetcher_with_scene())
      .run(IngestRequest::new(vec![Field::new("field-1", "user-1", 30.0, 31.0)]))
      .await
      .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.details[0].reason.as_deref(), Some("INDEX_PERSISTENCE_ERROR"));
  }

  #[tokio::test]
  async fn test_cache_failure_still_counts_inserted() {
    let mut store = reachable_store();
    store.expect_insert_image().returning(|_| Ok("img-1".to_string()));
    store.expect_insert_index().returning(|_| Ok(()));
    store
      .expect_update_field_cache()
      .returning(|_, _| Err(StoreError::rejected(500, "cache down")));

    let summary = pipeline(store, fetcher_with_scene())
      .run(IngestRequest::new(vec![Field::new("field-1", "user-1", 30.0, 31.0)]))
      .await
      .unwrap();

    assert_eq!((summary.inserted, summary.failed), (1, 0));
    assert!(summary.details[0].warning.as_deref().unwrap().contains("cache down"));
  }

  #[tokio::test]
  async fn test_missing_coordinates_never_fetch() {
    let mut store = reachable_store();
    store.expect_insert_image().never();
    let mut fetcher = MockSceneFetcher::new();
    fetcher.expect_fetch().never();

    let field = Field { id: "field-1".into(), owner_id: Some("user-1".into()), latitude: None, longitude: None };
    let summary = pipeline(store, fetcher).run(IngestRequest::new(vec![field])).await.unwrap();

    assert_eq!((summary.inserted, summary.skipped, summary.failed), (0, 1, 0));
    assert_eq!(summary.details[0].reason.as_deref(), Some("MISSING_COORDINATES"));
    assert!(summary.details[0].error.is_none());
  }

  #[tokio::test]
  async fn test_missing_owner_is_skipped() {
    let mut store = reachable_store();
    store.expect_insert_image().never();
    let mut fetcher = MockSceneFetcher::new();
    fetcher.expect_fetch().never();

    let mut field = Field::new("field-1", "user-1", 30.0, 31.0);
    field.owner_id = None;
    let summary = pipeline(store, fetcher).run(IngestRequest::new(vec![field])).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.details[0].reason.as_deref(), Some("MISSING_OWNER"));
  }

  #[tokio::test]
  async fn test_fetch_error_is_failure() {
    let mut store = reachable_store();
    store.expect_insert_image().never();
    let mut fetcher = MockSceneFetcher::new();
    fetcher
      .expect_fetch()
      .returning(|_, _| Err(FetchError::Http { status: 502, body: "bad gateway".into() }));

    let summary = pipeline(store, fetcher)
      .run(IngestRequest::new(vec![Field::new("field-1", "user-1", 30.0, 31.0)]))
      .await
      .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.details[0].reason.as_deref(), Some("FETCH_ERROR"));
  }

  #[tokio::test]
  async fn test_fetcher_receives_requested_date() {
    let mut store = reachable_store();
    store.expect_insert_image().never();
    let mut fetcher = MockSceneFetcher::new();
    fetcher
      .expect_fetch()
      .withf(|field, date| field.id == "field-1" && *date == target_date())
      .times(1)
      .returning(|_, _| Ok(None));

    let summary = pipeline(store, fetcher)
      .run(IngestRequest::new(vec![Field::new("field-1", "user-1", 30.0, 31.0)]).with_date(target_date()))
      .await
      .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.details[0].reason.as_deref(), Some("NO_SCENE"));
  }

  #[tokio::test]
  async fn test_request_fetcher_overrides_default() {
    let mut store = reachable_store();
    store.expect_insert_image().never();
    let mut default_fetcher = MockSceneFetcher::new();
    default_fetcher.expect_fetch().never();
    let mut override_fetcher = MockSceneFetcher::new();
    override_fetcher.expect_fetch().times(1).returning(|_, _| Ok(None));

    let summary = pipeline(store, default_fetcher)
      .run(
        IngestRequest::new(vec![Field::new("field-1", "user-1", 30.0, 31.0)])
          .with_fetcher(Arc::new(override_fetcher)),
      )
      .await
      .unwrap();

    assert_eq!(summary.skipped, 1);
  }

  #[tokio::test]
  async fn test_unreachable_store_rejects_batch() {
    let mut store = MockIngestStore::new();
    store.expect_ping().returning(|| Err(StoreError::unavailable("connection refused")));
    store.expect_insert_image().never();
    let mut fetcher = MockSceneFetcher::new();
    fetcher.expect_fetch().never();

    let result = pipeline(store, fetcher)
      .run(IngestRequest::new(vec![Field::new("field-1", "user-1", 30.0, 31.0)]))
      .await;

    assert!(matches!(result, Err(IngestError::StoreUnavailable(_))));
  }

  #[tokio::test]
  async fn test_empty_batch() {
    let summary = pipeline(reachable_store(), MockSceneFetcher::new())
      .run(IngestRequest::new(Vec::new()))
      .await
      .unwrap();

    assert_eq!(summary, BatchSummary::default());
  }

  #[test]
  fn test_summary_serializes_camel_case_details() {
    let mut summary = BatchSummary::default();
    summary.record(FieldReport::from_error("f1".into(), &FieldError::NoSceneAvailable));

    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(
      value,
      json!({
        "processed": 1,
        "inserted": 0,
        "skipped": 1,
        "failed": 0,
        "details": [{ "fieldId": "f1", "status": "skipped", "reason": "NO_SCENE" }]
      })
    );
  }
}
