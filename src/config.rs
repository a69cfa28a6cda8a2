//! Application configuration.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cache::Manifest;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the client and its precached resources are served from
  #[serde(default = "default_base_url")]
  pub base_url: String,

  /// Override for the directory holding the local databases and session
  /// snapshot (defaults to the platform data directory)
  #[serde(default)]
  pub data_dir: Option<PathBuf>,

  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Resource paths materialized for offline use, in install order
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      data_dir: None,
      cache: CacheConfig::default(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      precache: default_precache(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:3000".to_string()
}

fn default_precache() -> Vec<String> {
  [
    "/",
    "/manifest.json",
    "/app-logo.svg",
    "/icon-192.png",
    "/icon-512.png",
    "/static/app.js",
    "/static/app.css",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./fieldaudit.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fieldaudit/config.yaml
  ///
  /// With no file found, built-in defaults apply; the client must come up
  /// with zero setup in the field.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        debug!("no config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("fieldaudit.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fieldaudit").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Directory holding the local databases and session snapshot.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fieldaudit"))
  }

  pub fn records_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("records.db"))
  }

  pub fn cache_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("cache.db"))
  }

  pub fn snapshot_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("session.json"))
  }

  /// The precache list as a manifest.
  pub fn manifest(&self) -> Manifest {
    Manifest::new(self.cache.precache.clone())
  }

  /// Read the account password from the environment.
  ///
  /// Checks FIELDAUDIT_PASSWORD; passwords never appear on the command
  /// line.
  pub fn password_from_env() -> Result<String> {
    std::env::var("FIELDAUDIT_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set the FIELDAUDIT_PASSWORD environment variable."))
  }
}
