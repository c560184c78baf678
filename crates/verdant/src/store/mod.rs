//! Backing store abstraction
//!
//! The pipeline only ever sees `IngestStore`; it has no knowledge of how an
//! adapter builds queries. Field listing and user resolution are separate
//! traits because only the invocation surfaces need them.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Field, FieldCacheUpdate, FieldQuery, NewSatelliteImage, NewVegetationIndex};

pub mod memory;
pub mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

/// Writes performed by the ingestion pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestStore: Send + Sync {
  /// Cheap reachability check run once before a batch starts
  async fn ping(&self) -> Result<(), StoreError>;

  /// Insert an image row and return its generated identifier
  async fn insert_image(&self, image: &NewSatelliteImage) -> Result<String, StoreError>;

  /// Insert an index row linked to an existing image
  async fn insert_index(&self, index: &NewVegetationIndex) -> Result<(), StoreError>;

  /// Refresh the cached last-reading attributes on a field
  async fn update_field_cache(
    &self,
    field_id: &str,
    update: &FieldCacheUpdate,
  ) -> Result<(), StoreError>;

  /// Remove an image whose index row could not be written
  async fn discard_image(&self, image_id: &str) -> Result<(), StoreError>;
}

/// Loads the fields a batch should process
#[async_trait]
pub trait FieldDirectory: Send + Sync {
  async fn list_fields(&self, query: &FieldQuery) -> Result<Vec<Field>, StoreError>;
}

/// Maps a caller's access token to a user id; `Ok(None)` means not signed in
#[async_trait]
pub trait Authenticator: Send + Sync {
  async fn resolve_user(&self, access_token: &str) -> Result<Option<String>, StoreError>;
}
