//! Vegetation index derivation
//!
//! The provider returns an NDVI raster; EVI and NDWI are approximated from
//! the NDVI mean because the process request only carries the B08/B04 bands.

const RASTER_SAMPLE_BYTES: usize = 4096;

fn round4(value: f64) -> f64 {
  (value * 10_000.0).round() / 10_000.0
}

/// Normalize an index value into [-1, 1] with four decimals
pub fn clamp_index(value: f64) -> f64 {
  if !value.is_finite() {
    return 0.0;
  }
  round4(value).clamp(-1.0, 1.0)
}

/// Mean NDVI estimate from the leading bytes of a raster payload
pub fn ndvi_from_raster(raster: &[u8]) -> f64 {
  if raster.is_empty() {
    return 0.0;
  }
  let sample = &raster[..raster.len().min(RASTER_SAMPLE_BYTES)];
  let sum: u64 = sample.iter().map(|&b| u64::from(b)).sum();
  let avg = sum as f64 / sample.len() as f64;
  clamp_index(avg / 255.0 * 2.0 - 1.0)
}

pub fn evi_from_ndvi(ndvi: f64) -> f64 {
  round4((2.5 * ((ndvi + 1.0) / 3.0)).clamp(-1.0, 1.0))
}

pub fn ndwi_from_ndvi(ndvi: f64) -> f64 {
  round4((0.5 - ndvi / 2.0).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clamp_index_handles_non_finite() {
    assert_eq!(clamp_index(f64::NAN), 0.0);
    assert_eq!(clamp_index(f64::INFINITY), 0.0);
    assert_eq!(clamp_index(3.0), 1.0);
    assert_eq!(clamp_index(-7.5), -1.0);
    assert_eq!(clamp_index(0.123456), 0.1235);
  }

  #[test]
  fn test_ndvi_from_raster_extremes() {
    assert_eq!(ndvi_from_raster(&[]), 0.0);
    assert_eq!(ndvi_from_raster(&[0; 16]), -1.0);
    assert_eq!(ndvi_from_raster(&[255; 16]), 1.0);
  }

  #[test]
  fn test_ndvi_from_raster_samples_leading_bytes_only() {
    let mut raster = vec![255u8; RASTER_SAMPLE_BYTES];
    raster.extend(std::iter::repeat(0u8).take(10_000));
    assert_eq!(ndvi_from_raster(&raster), 1.0);
  }

  #[test]
  fn test_derived_indices() {
    assert_eq!(evi_from_ndvi(0.2), 1.0);
    assert_eq!(evi_from_ndvi(-1.0), 0.0);
    assert_eq!(evi_from_ndvi(-0.5), 0.4167);
    assert_eq!(ndwi_from_ndvi(0.4), 0.3);
    assert_eq!(ndwi_from_ndvi(-1.0), 1.0);
  }
}
