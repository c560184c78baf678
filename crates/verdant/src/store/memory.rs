//! In-process store with per-operation failure injection

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Authenticator, FieldDirectory, IngestStore};
use crate::error::StoreError;
use crate::model::{Field, FieldCacheUpdate, FieldQuery, NewSatelliteImage, NewVegetationIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
  Ping,
  ListFields,
  InsertImage,
  InsertIndex,
  UpdateFieldCache,
  DiscardImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
  pub id: String,
  pub record: NewSatelliteImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredIndex {
  pub id: String,
  pub record: NewVegetationIndex,
}

#[derive(Default)]
struct MemoryState {
  fields: Vec<Field>,
  sessions: HashMap<String, String>,
  images: Vec<StoredImage>,
  indices: Vec<StoredIndex>,
  field_cache: HashMap<String, FieldCacheUpdate>,
  // `None` field id fails the operation for every field
  failures: HashSet<(StoreOperation, Option<String>)>,
  withhold_image_ids: bool,
}

impl MemoryState {
  fn check(&self, op: StoreOperation, field_id: Option<&str>) -> Result<(), StoreError> {
    let all = self.failures.contains(&(op, None));
    let this_field =
      field_id.is_some_and(|id| self.failures.contains(&(op, Some(id.to_string()))));
    if all || this_field {
      return Err(StoreError::rejected(500, format!("injected {op:?} failure")));
    }
    Ok(())
  }
}

#[derive(Default)]
pub struct MemoryStore {
  state: Mutex<MemoryState>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_fields(fields: Vec<Field>) -> Self {
    Self { state: Mutex::new(MemoryState { fields, ..MemoryState::default() }) }
  }

  /// Accept `access_token` as a signed-in session for `user_id`
  pub async fn add_session(&self, access_token: impl Into<String>, user_id: impl Into<String>) {
    self.state.lock().await.sessions.insert(access_token.into(), user_id.into());
  }

  /// Make `op` fail for every field
  pub async fn fail(&self, op: StoreOperation) {
    self.state.lock().await.failures.insert((op, None));
  }

  /// Make `op` fail only for one field
  pub async fn fail_for_field(&self, op: StoreOperation, field_id: impl Into<String>) {
    self.state.lock().await.failures.insert((op, Some(field_id.into())));
  }

  /// Accept image inserts but report no generated identifier
  pub async fn withhold_image_ids(&self) {
    self.state.lock().await.withhold_image_ids = true;
  }

  pub async fn images(&self) -> Vec<StoredImage> {
    self.state.lock().await.images.clone()
  }

  pub async fn indices(&self) -> Vec<StoredIndex> {
    self.state.lock().await.indices.clone()
  }

  pub async fn field_cache(&self, field_id: &str) -> Option<FieldCacheUpdate> {
    self.state.lock().await.field_cache.get(field_id).cloned()
  }
}

#[async_trait]
impl IngestStore for MemoryStore {
  async fn ping(&self) -> Result<(), StoreError> {
    let state = self.state.lock().await;
    if state.failures.contains(&(StoreOperation::Ping, None)) {
      return Err(StoreError::unavailable("injected ping failure"));
    }
    Ok(())
  }

  async fn insert_image(&self, image: &NewSatelliteImage) -> Result<String, StoreError> {
    let mut state = self.state.lock().await;
    state.check(StoreOperation::InsertImage, Some(&image.field_id))?;

    let id = Uuid::new_v4().to_string();
    state.images.push(StoredImage { id: id.clone(), record: image.clone() });
    if state.withhold_image_ids {
      return Err(StoreError::MissingId);
    }
    Ok(id)
  }

  async fn insert_index(&self, index: &NewVegetationIndex) -> Result<(), StoreError> {
    let mut state = self.state.lock().await;
    state.check(StoreOperation::InsertIndex, Some(&index.field_id))?;

    if !state.images.iter().any(|image| image.id == index.image_id) {
      return Err(StoreError::rejected(
        409,
        format!("image {} does not exist", index.image_id),
      ));
    }
    state.indices.push(StoredIndex { id: Uuid::new_v4().to_string(), record: index.clone() });
    Ok(())
  }

  async fn update_field_cache(
    &self,
    field_id: &str,
    update: &FieldCacheUpdate,
  ) -> Result<(), StoreError> {
    let mut state = self.state.lock().await;
    state.check(StoreOperation::UpdateFieldCache, Some(field_id))?;
    state.field_cache.insert(field_id.to_string(), update.clone());
    Ok(())
  }

  async fn discard_image(&self, image_id: &str) -> Result<(), StoreError> {
    let mut state = self.state.lock().await;
    let field_id =
      state.images.iter().find(|image| image.id == image_id).map(|image| image.record.field_id.clone());
    state.check(StoreOperation::DiscardImage, field_id.as_deref())?;
    state.images.retain(|image| image.id != image_id);
    Ok(())
  }
}

#[async_trait]
impl FieldDirectory for MemoryStore {
  async fn list_fields(&self, query: &FieldQuery) -> Result<Vec<Field>, StoreError> {
    let state = self.state.lock().await;
    state.check(StoreOperation::ListFields, None)?;
    Ok(state.fields.iter().filter(|field| query.matches(field)).cloned().collect())
  }
}

#[async_trait]
impl Authenticator for MemoryStore {
  async fn resolve_user(&self, access_token: &str) -> Result<Option<String>, StoreError> {
    Ok(self.state.lock().await.sessions.get(access_token).cloned())
  }
}
