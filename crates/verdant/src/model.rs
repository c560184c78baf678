//! Domain types shared by the fetchers, the stores and the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque provider metadata, passed through to storage unchanged
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A monitored land parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
  pub id: String,
  pub owner_id: Option<String>,
  pub latitude: Option<f64>,
  pub longitude: Option<f64>,
}

impl Field {
  pub fn new(
    id: impl Into<String>,
    owner_id: impl Into<String>,
    latitude: f64,
    longitude: f64,
  ) -> Self {
    Self {
      id: id.into(),
      owner_id: Some(owner_id.into()),
      latitude: Some(latitude),
      longitude: Some(longitude),
    }
  }

  /// Center point of the field, if both coordinates are known
  pub fn coordinates(&self) -> Option<Coordinates> {
    match (self.latitude, self.longitude) {
      (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub latitude: f64,
  pub longitude: f64,
}

/// Axis-aligned bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
  pub west: f64,
  pub south: f64,
  pub east: f64,
  pub north: f64,
}

impl Bounds {
  /// Square box of `delta` degrees around a center point
  pub fn around(center: Coordinates, delta: f64) -> Self {
    Self {
      west: center.longitude - delta,
      east: center.longitude + delta,
      south: center.latitude - delta,
      north: center.latitude + delta,
    }
  }

  pub fn bbox(&self) -> [f64; 4] {
    [self.west, self.south, self.east, self.north]
  }
}

/// One satellite observation over a field, as returned by a scene fetcher.
///
/// Scenes are never stored directly; the pipeline splits them into an image
/// row and an index row.
#[derive(Debug, Clone, PartialEq)]
pub struct VegetationScene {
  pub provider: String,
  pub captured_at: DateTime<Utc>,
  pub ndvi: f64,
  pub evi: Option<f64>,
  pub ndwi: Option<f64>,
  pub metadata: Metadata,
  pub image: Option<Vec<u8>>,
}

/// Row written to `satellite_images`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSatelliteImage {
  pub field_id: String,
  pub user_id: String,
  pub provider: String,
  pub captured_at: DateTime<Utc>,
  pub image_url: Option<String>,
  pub file_path: Option<String>,
  pub band_data: Metadata,
}

/// Row written to `ndvi_indices`. `image_id` must point at an existing image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVegetationIndex {
  pub field_id: String,
  pub image_id: String,
  pub user_id: String,
  pub provider: String,
  pub ndvi_value: f64,
  pub evi_value: Option<f64>,
  pub ndwi_value: Option<f64>,
  pub computed_at: DateTime<Utc>,
}

/// Cached last-reading attributes on a field row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCacheUpdate {
  pub last_ndvi: f64,
  pub last_reading_at: DateTime<Utc>,
}

/// Filter for loading fields from the backing store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldQuery {
  pub owner_id: Option<String>,
  pub field_id: Option<String>,
}

impl FieldQuery {
  pub fn all() -> Self {
    Self::default()
  }

  pub fn owned_by(owner_id: impl Into<String>) -> Self {
    Self { owner_id: Some(owner_id.into()), field_id: None }
  }

  pub fn with_field(mut self, field_id: Option<String>) -> Self {
    self.field_id = field_id;
    self
  }

  pub fn matches(&self, field: &Field) -> bool {
    let owner_ok = self.owner_id.as_ref().map_or(true, |owner| field.owner_id.as_ref() == Some(owner));
    let field_ok = self.field_id.as_ref().map_or(true, |id| &field.id == id);
    owner_ok && field_ok
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_coordinates_require_both_axes() {
    let mut field = Field::new("f1", "u1", 30.1, 31.2);
    assert_eq!(field.coordinates(), Some(Coordinates { latitude: 30.1, longitude: 31.2 }));

    field.longitude = None;
    assert!(field.coordinates().is_none());

    field.longitude = Some(31.2);
    field.latitude = None;
    assert!(field.coordinates().is_none());
  }

  #[test]
  fn test_bounds_around_center() {
    let bounds = Bounds::around(Coordinates { latitude: 30.0, longitude: 31.0 }, 0.02);
    let expected = [30.98, 29.98, 31.02, 30.02];
    for (actual, expected) in bounds.bbox().iter().zip(expected) {
      assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }
  }

  #[test]
  fn test_field_query_matching() {
    let field = Field::new("f1", "u1", 1.0, 2.0);

    assert!(FieldQuery::all().matches(&field));
    assert!(FieldQuery::owned_by("u1").matches(&field));
    assert!(!FieldQuery::owned_by("u2").matches(&field));
    assert!(FieldQuery::owned_by("u1").with_field(Some("f1".into())).matches(&field));
    assert!(!FieldQuery::all().with_field(Some("f2".into())).matches(&field));
  }
}
