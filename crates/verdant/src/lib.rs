//! Verdant - vegetation-index ingestion for monitored farm fields
//!
//! Fetches satellite scenes for a batch of fields, persists an image record
//! and a linked NDVI/EVI/NDWI index record per field, and reports how many
//! fields were inserted, skipped or failed.

pub mod config;
pub mod display;
pub mod error;
pub mod fetcher;
pub mod indices;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod store;

pub use error::{FetchError, FieldError, IngestError, StoreError};
pub use model::{Field, VegetationScene};
pub use pipeline::{BatchSummary, FieldReport, FieldStatus, IngestRequest, Pipeline, PipelineSettings};
