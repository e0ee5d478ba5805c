//! Player backend configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "cinecase";
const CONFIG_FILE_NAME: &str = "player.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config file: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config file: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Backend configuration supplied at player creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Explicit backend name (None = first available in preference order).
  #[serde(default)]
  pub backend: Option<String>,

  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Additional MPV command-line arguments.
  #[serde(default)]
  pub mpv_args: Vec<String>,

  /// Custom VLC executable path.
  #[serde(default)]
  pub vlc_path: Option<String>,

  /// Time to wait for a command response.
  #[serde(default = "default_response_timeout_ms")]
  pub response_timeout_ms: u64,

  /// Control channel connection attempts before giving up.
  #[serde(default = "default_connect_attempts")]
  pub connect_attempts: u32,

  /// Delay between control channel connection attempts.
  #[serde(default = "default_connect_interval_ms")]
  pub connect_interval_ms: u64,

  /// Playback position polling interval.
  #[serde(default = "default_progress_interval_ms")]
  pub progress_interval_ms: u64,
}

fn default_response_timeout_ms() -> u64 {
  5000
}

fn default_connect_attempts() -> u32 {
  10
}

fn default_connect_interval_ms() -> u64 {
  200
}

fn default_progress_interval_ms() -> u64 {
  750
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      backend: None,
      mpv_path: None,
      mpv_args: Vec::new(),
      vlc_path: None,
      response_timeout_ms: default_response_timeout_ms(),
      connect_attempts: default_connect_attempts(),
      connect_interval_ms: default_connect_interval_ms(),
      progress_interval_ms: default_progress_interval_ms(),
    }
  }
}

impl PlayerConfig {
  /// Default config file location.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
  }

  /// Load from the default location. A missing file yields defaults.
  pub fn load() -> Result<Self, ConfigError> {
    match Self::default_path() {
      Some(path) if path.exists() => Self::from_file(&path),
      Some(path) => {
        log::debug!("No config file at {}, using defaults", path.display());
        Ok(Self::default())
      }
      None => {
        log::warn!("Impossible to find config directory, using default config");
        Ok(Self::default())
      }
    }
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = Self::from_toml_str(&content)?;
    log::info!("Loaded player config from {}", path.display());
    Ok(config)
  }

  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.response_timeout_ms == 0 {
      return Err(ConfigError::Invalid(
        "Response timeout must be greater than zero".to_string(),
      ));
    }
    if self.connect_attempts == 0 {
      return Err(ConfigError::Invalid(
        "Connect attempts must be at least 1".to_string(),
      ));
    }
    if self.connect_interval_ms == 0 || self.connect_interval_ms > 60_000 {
      return Err(ConfigError::Invalid(
        "Connect interval must be between 1 ms and 60 seconds".to_string(),
      ));
    }
    if self.progress_interval_ms == 0 || self.progress_interval_ms > 60_000 {
      return Err(ConfigError::Invalid(
        "Progress interval must be between 1 ms and 60 seconds".to_string(),
      ));
    }
    if matches!(&self.backend, Some(name) if name.trim().is_empty()) {
      return Err(ConfigError::Invalid("Backend name cannot be empty".to_string()));
    }
    Ok(())
  }

  /// MPV executable override, ignoring blank values.
  pub fn mpv_executable(&self) -> Option<PathBuf> {
    self
      .mpv_path
      .as_ref()
      .filter(|s| !s.trim().is_empty())
      .map(PathBuf::from)
  }

  pub fn response_timeout(&self) -> Duration {
    Duration::from_millis(self.response_timeout_ms)
  }

  pub fn connect_interval(&self) -> Duration {
    Duration::from_millis(self.connect_interval_ms)
  }

  pub fn progress_interval(&self) -> Duration {
    Duration::from_millis(self.progress_interval_ms)
  }
}
