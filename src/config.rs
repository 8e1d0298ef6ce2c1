//! Configuration for cache sizes, TTLs, debounce and retry cadence.
//!
//! Everything has a sensible default; a YAML file and `CLINIC_DATA_*`
//! environment variables can override the knobs per deployment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::error::{DataError, Result};
use crate::queue::QueueConfig;

/// Tuning for one resource cache.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResourceCacheConfig {
  pub max_entries: usize,
  pub ttl_secs: u64,
  #[serde(default)]
  pub promote_on_hit: bool,
}

impl ResourceCacheConfig {
  pub fn cache_config(&self) -> CacheConfig {
    let config = CacheConfig::new(Duration::from_secs(self.ttl_secs), self.max_entries);
    if self.promote_on_hit {
      config.with_promotion()
    } else {
      config
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
  /// Patient details: long-lived, re-read constantly while charting.
  pub patients: ResourceCacheConfig,
  /// Appointments: queried per day, go stale fast as the schedule moves.
  pub appointments: ResourceCacheConfig,
  /// Consultation suggestions and prescription templates.
  pub suggestions: ResourceCacheConfig,
  /// Master-data lists: big, nearly immutable catalogs.
  pub master_data: ResourceCacheConfig,

  pub search_debounce_ms: u64,
  pub upload_retry_secs: u64,
  pub upload_max_attempts: u32,
}

impl Default for DataConfig {
  fn default() -> Self {
    Self {
      patients: ResourceCacheConfig {
        max_entries: 500,
        ttl_secs: 600,
        promote_on_hit: true,
      },
      appointments: ResourceCacheConfig {
        max_entries: 150,
        ttl_secs: 30,
        promote_on_hit: false,
      },
      suggestions: ResourceCacheConfig {
        max_entries: 300,
        ttl_secs: 300,
        promote_on_hit: false,
      },
      master_data: ResourceCacheConfig {
        max_entries: 2500,
        ttl_secs: 300,
        promote_on_hit: false,
      },
      search_debounce_ms: 300,
      upload_retry_secs: 20,
      upload_max_attempts: 20,
    }
  }
}

impl DataConfig {
  /// Load configuration.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./clinic-data.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/clinic-data/config.yaml
  ///
  /// A missing file is not an error: defaults apply. Environment overrides
  /// are applied last either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if !p.exists() {
        return Err(DataError::Validation(format!(
          "config file not found: {}",
          p.display()
        )));
      }
      Some(p.to_path_buf())
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.apply_env_overrides();
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("clinic-data.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("clinic-data").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      DataError::Validation(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    serde_yaml::from_str(&contents).map_err(|e| {
      DataError::Validation(format!(
        "failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })
  }

  /// `CLINIC_DATA_*` variables override the numeric knobs.
  fn apply_env_overrides(&mut self) {
    fn env<T: std::str::FromStr>(name: &str) -> Option<T> {
      std::env::var(name).ok()?.parse().ok()
    }

    if let Some(v) = env("CLINIC_DATA_PATIENT_CACHE_MAX") {
      self.patients.max_entries = v;
    }
    if let Some(v) = env("CLINIC_DATA_APPOINTMENT_CACHE_MAX") {
      self.appointments.max_entries = v;
    }
    if let Some(v) = env("CLINIC_DATA_SUGGESTION_CACHE_MAX") {
      self.suggestions.max_entries = v;
    }
    if let Some(v) = env("CLINIC_DATA_MASTER_CACHE_MAX") {
      self.master_data.max_entries = v;
    }
    if let Some(v) = env("CLINIC_DATA_SEARCH_DEBOUNCE_MS") {
      self.search_debounce_ms = v;
    }
    if let Some(v) = env("CLINIC_DATA_UPLOAD_RETRY_SECS") {
      self.upload_retry_secs = v;
    }
    if let Some(v) = env("CLINIC_DATA_UPLOAD_MAX_ATTEMPTS") {
      self.upload_max_attempts = v;
    }
  }

  pub fn search_debounce(&self) -> Duration {
    Duration::from_millis(self.search_debounce_ms)
  }

  pub fn queue_config(&self) -> QueueConfig {
    QueueConfig {
      retry_interval: Duration::from_secs(self.upload_retry_secs),
      max_attempts: self.upload_max_attempts,
    }
  }
}
