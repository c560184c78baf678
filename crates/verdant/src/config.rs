//! Runtime configuration
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables, so deployments can keep secrets out of the file.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_SENTINEL_BASE_URL: &str = "https://services.sentinel-hub.com";
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BOUNDS_DELTA: f64 = 0.02;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub sentinel: SentinelConfig,
  pub store: StoreConfig,
  pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
  pub client_id: Option<String>,
  pub client_secret: Option<String>,
  pub config_id: Option<String>,
  pub disabled: bool,
  pub base_url: String,
  pub bounds_delta: f64,
}

impl Default for SentinelConfig {
  fn default() -> Self {
    Self {
      client_id: None,
      client_secret: None,
      config_id: None,
      disabled: false,
      base_url: DEFAULT_SENTINEL_BASE_URL.to_string(),
      bounds_delta: DEFAULT_BOUNDS_DELTA,
    }
  }
}

impl SentinelConfig {
  /// Sentinel Hub is usable only when enabled and all three credentials are set
  pub fn is_configured(&self) -> bool {
    !self.disabled
      && non_empty(&self.client_id)
      && non_empty(&self.client_secret)
      && non_empty(&self.config_id)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  pub url: Option<String>,
  pub service_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub concurrency: usize,
  pub fetch_timeout_secs: u64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self { concurrency: DEFAULT_CONCURRENCY, fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS }
  }
}

impl PipelineConfig {
  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.fetch_timeout_secs)
  }
}

impl Config {
  /// Load from an explicit path, `VERDANT_CONFIG`, or `~/.verdant/config.yaml`,
  /// then apply environment overrides. A missing default file is not an error.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let explicit = path.map(Path::to_path_buf).or_else(|| env::var("VERDANT_CONFIG").ok().map(PathBuf::from));

    let mut config = match explicit {
      Some(path) => Self::from_file(&path)?,
      None => match default_config_path().filter(|p| p.exists()) {
        Some(path) => Self::from_file(&path)?,
        None => Self::default(),
      },
    };

    config.apply_env()?;
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path)
      .map_err(|source| ConfigError::Read { path: display.clone(), source })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path: display, source })
  }

  /// Overlay environment variables on top of file settings
  pub fn apply_env(&mut self) -> Result<(), ConfigError> {
    if let Some(value) = env_any(&["SENTINEL_HUB_CLIENT_ID", "VITE_SENTINEL_HUB_CLIENT_ID"]) {
      self.sentinel.client_id = Some(value);
    }
    if let Some(value) = env_any(&["SENTINEL_HUB_CLIENT_SECRET", "VITE_SENTINEL_HUB_CLIENT_SECRET"]) {
      self.sentinel.client_secret = Some(value);
    }
    if let Some(value) = env_any(&["SENTINEL_HUB_CONFIG_ID", "VITE_SENTINEL_HUB_CONFIG_ID"]) {
      self.sentinel.config_id = Some(value);
    }
    if let Some(value) = env_any(&["SENTINEL_HUB_BASE_URL"]) {
      self.sentinel.base_url = value;
    }
    if let Some(value) = env_any(&["DISABLE_SENTINEL"]) {
      self.sentinel.disabled = parse_bool(&value, self.sentinel.disabled);
    }

    if let Some(value) = env_any(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"]) {
      self.store.url = Some(value);
    }
    if let Some(value) = env_any(&["SUPABASE_SERVICE_ROLE_KEY"]) {
      self.store.service_key = Some(value);
    }

    if let Some(value) = env_any(&["NDVI_CONCURRENCY"]) {
      self.pipeline.concurrency = match value.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => return Err(ConfigError::invalid_value("NDVI_CONCURRENCY", value)),
      };
    }
    if let Some(value) = env_any(&["NDVI_FETCH_TIMEOUT_SECS"]) {
      self.pipeline.fetch_timeout_secs = match value.parse::<u64>() {
        Ok(n) if n > 0 => n,
        _ => return Err(ConfigError::invalid_value("NDVI_FETCH_TIMEOUT_SECS", value)),
      };
    }

    Ok(())
  }
}

/// `~/.verdant/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
  dirs::home_dir().map(|home| home.join(".verdant").join("config.yaml"))
}

/// Lenient boolean parsing for feature flags; unknown values keep `fallback`
pub fn parse_bool(value: &str, fallback: bool) -> bool {
  match value.trim().to_lowercase().as_str() {
    "1" | "true" | "yes" | "on" | "enabled" => true,
    "0" | "false" | "no" | "off" | "disabled" => false,
    _ => fallback,
  }
}

fn env_any(keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
}

fn non_empty(value: &Option<String>) -> bool {
  value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use std::fs;
  use tempfile::TempDir;

  const ENV_KEYS: &[&str] = &[
    "VERDANT_CONFIG",
    "SENTINEL_HUB_CLIENT_ID",
    "VITE_SENTINEL_HUB_CLIENT_ID",
    "SENTINEL_HUB_CLIENT_SECRET",
    "VITE_SENTINEL_HUB_CLIENT_SECRET",
    "SENTINEL_HUB_CONFIG_ID",
    "VITE_SENTINEL_HUB_CONFIG_ID",
    "SENTINEL_HUB_BASE_URL",
    "DISABLE_SENTINEL",
    "SUPABASE_URL",
    "NEXT_PUBLIC_SUPABASE_URL",
    "SUPABASE_SERVICE_ROLE_KEY",
    "NDVI_CONCURRENCY",
    "NDVI_FETCH_TIMEOUT_SECS",
  ];

  fn clear_env() {
    for key in ENV_KEYS {
      env::remove_var(key);
    }
  }

  #[test]
  fn test_parse_bool() {
    assert!(parse_bool("Yes", false));
    assert!(parse_bool(" enabled ", false));
    assert!(!parse_bool("off", true));
    assert!(parse_bool("maybe", true));
    assert!(!parse_bool("", false));
  }

  #[test]
  fn test_sentinel_requires_all_credentials() {
    let mut sentinel = SentinelConfig {
      client_id: Some("id".into()),
      client_secret: Some("secret".into()),
      config_id: Some("cfg".into()),
      ..SentinelConfig::default()
    };
    assert!(sentinel.is_configured());

    sentinel.disabled = true;
    assert!(!sentinel.is_configured());

    sentinel.disabled = false;
    sentinel.config_id = Some("  ".into());
    assert!(!sentinel.is_configured());
  }

  #[test]
  #[serial]
  fn test_load_from_yaml_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    fs::write(
      &path,
      "store:\n  url: https://db.example.com\n  service_key: svc\npipeline:\n  concurrency: 3\n",
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.store.url.as_deref(), Some("https://db.example.com"));
    assert_eq!(config.store.service_key.as_deref(), Some("svc"));
    assert_eq!(config.pipeline.concurrency, 3);
    assert_eq!(config.pipeline.fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
    assert_eq!(config.sentinel.base_url, DEFAULT_SENTINEL_BASE_URL);
  }

  #[test]
  #[serial]
  fn test_env_overrides_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");
    fs::write(&path, "pipeline:\n  concurrency: 3\n").unwrap();

    env::set_var("NDVI_CONCURRENCY", "12");
    env::set_var("VITE_SENTINEL_HUB_CLIENT_ID", "vite-id");
    env::set_var("SENTINEL_HUB_CLIENT_SECRET", "secret");
    env::set_var("SENTINEL_HUB_CONFIG_ID", "cfg");
    env::set_var("NEXT_PUBLIC_SUPABASE_URL", "https://public.example.com");

    let config = Config::load(Some(&path)).unwrap();
    clear_env();

    assert_eq!(config.pipeline.concurrency, 12);
    assert_eq!(config.sentinel.client_id.as_deref(), Some("vite-id"));
    assert!(config.sentinel.is_configured());
    assert_eq!(config.store.url.as_deref(), Some("https://public.example.com"));
  }

  #[test]
  #[serial]
  fn test_disable_flag_turns_sentinel_off() {
    clear_env();
    env::set_var("SENTINEL_HUB_CLIENT_ID", "id");
    env::set_var("SENTINEL_HUB_CLIENT_SECRET", "secret");
    env::set_var("SENTINEL_HUB_CONFIG_ID", "cfg");
    env::set_var("DISABLE_SENTINEL", "true");

    let mut config = Config::default();
    config.apply_env().unwrap();
    clear_env();

    assert!(config.sentinel.disabled);
    assert!(!config.sentinel.is_configured());
  }

  #[test]
  #[serial]
  fn test_invalid_numeric_env_is_rejected() {
    clear_env();
    env::set_var("NDVI_CONCURRENCY", "0");

    let mut config = Config::default();
    let result = config.apply_env();
    clear_env();

    match result {
      Err(ConfigError::InvalidValue { key, value }) => {
        assert_eq!(key, "NDVI_CONCURRENCY");
        assert_eq!(value, "0");
      }
      other => panic!("Expected InvalidValue error, got: {other:?}"),
    }
  }

  #[test]
  #[serial]
  fn test_missing_explicit_file_is_an_error() {
    clear_env();
    let result = Config::load(Some(Path::new("/nonexistent/verdant/config.yaml")));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
  }
}
