//! Error types for the ingestion pipeline
//!
//! Per-field problems (`FieldError`) are always folded into the batch summary.
//! Only `IngestError` ever escapes `Pipeline::run`.

use std::time::Duration;

use thiserror::Error;

/// Upstream imagery provider errors
#[derive(Error, Debug)]
pub enum FetchError {
  #[error("provider is not configured: {message}")]
  NotConfigured { message: String },

  #[error("provider rejected credentials ({status}): {message}")]
  Auth { status: u16, message: String },

  #[error("provider request failed ({status}): {body}")]
  Http { status: u16, body: String },

  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("malformed provider response: {message}")]
  Malformed { message: String },

  #[error("fetch exceeded deadline of {0:?}")]
  Timeout(Duration),
}

impl FetchError {
  pub fn not_configured(message: impl Into<String>) -> Self {
    Self::NotConfigured { message: message.into() }
  }

  pub fn malformed(message: impl Into<String>) -> Self {
    Self::Malformed { message: message.into() }
  }
}

/// Backing store errors
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("store is unreachable: {message}")]
  Unavailable { message: String },

  #[error("store rejected request ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("store did not return a generated identifier")]
  MissingId,

  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("unexpected store response: {message}")]
  Decode { message: String },
}

impl StoreError {
  pub fn unavailable(message: impl Into<String>) -> Self {
    Self::Unavailable { message: message.into() }
  }

  pub fn rejected(status: u16, message: impl Into<String>) -> Self {
    Self::Rejected { status, message: message.into() }
  }

  pub fn decode(message: impl Into<String>) -> Self {
    Self::Decode { message: message.into() }
  }
}

/// Which write failed during persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
  Image,
  Index,
}

impl std::fmt::Display for PersistStage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PersistStage::Image => write!(f, "satellite image"),
      PersistStage::Index => write!(f, "vegetation index"),
    }
  }
}

/// Why a single field was not ingested
#[derive(Error, Debug)]
pub enum FieldError {
  #[error("field has no coordinates")]
  CoordinatesMissing,

  #[error("field has no owner")]
  OwnerMissing,

  #[error("no scene available")]
  NoSceneAvailable,

  #[error("scene fetch failed: {0}")]
  FetchFailure(#[source] FetchError),

  #[error("{stage} write failed: {source}")]
  PersistenceFailure {
    stage: PersistStage,
    #[source]
    source: StoreError,
  },
}

impl FieldError {
  /// Skips mean there was nothing to ingest; everything else is a failure.
  pub fn is_skip(&self) -> bool {
    matches!(self, Self::CoordinatesMissing | Self::OwnerMissing | Self::NoSceneAvailable)
  }

  /// Stable, machine-readable reason code reported in batch details
  pub fn reason(&self) -> &'static str {
    match self {
      Self::CoordinatesMissing => "MISSING_COORDINATES",
      Self::OwnerMissing => "MISSING_OWNER",
      Self::NoSceneAvailable => "NO_SCENE",
      Self::FetchFailure(FetchError::Timeout(_)) => "FETCH_TIMEOUT",
      Self::FetchFailure(_) => "FETCH_ERROR",
      Self::PersistenceFailure { stage: PersistStage::Image, .. } => "IMAGE_PERSISTENCE_ERROR",
      Self::PersistenceFailure { stage: PersistStage::Index, .. } => "INDEX_PERSISTENCE_ERROR",
    }
  }
}

/// Setup-level failure that prevents a batch from starting
#[derive(Error, Debug)]
pub enum IngestError {
  #[error("backing store unavailable: {0}")]
  StoreUnavailable(#[source] StoreError),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("invalid value for {key}: {value}")]
  InvalidValue { key: String, value: String },

  #[error("missing required setting: {key}")]
  Missing { key: String },
}

impl ConfigError {
  pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
    Self::InvalidValue { key: key.into(), value: value.into() }
  }

  pub fn missing(key: impl Into<String>) -> Self {
    Self::Missing { key: key.into() }
  }
}
