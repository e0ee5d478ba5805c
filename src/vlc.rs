//! VLC backend placeholder.
//!
//! Registered so it can be selected by name, but reports itself unavailable
//! and rejects every control operation until it is implemented.

use std::path::Path;

use async_trait::async_trait;

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::player::{LoadOptions, MediaPlayer, PlayerStatus, StatusStore, Subscription};

pub const BACKEND_NAME: &str = "vlc";

pub struct VlcPlayer {
  status: StatusStore,
}

impl VlcPlayer {
  pub fn new(config: &PlayerConfig) -> Self {
    if let Some(path) = &config.vlc_path {
      log::debug!("VLC path configured but unused: {}", path);
    }
    Self {
      status: StatusStore::new(),
    }
  }

  fn unavailable<T>(&self) -> Result<T> {
    Err(PlayerError::BackendUnavailable(BACKEND_NAME))
  }
}

#[async_trait]
impl MediaPlayer for VlcPlayer {
  fn name(&self) -> &'static str {
    BACKEND_NAME
  }

  fn is_available(&self) -> bool {
    false
  }

  async fn load_media(&self, _path: &Path, _options: LoadOptions) -> Result<()> {
    self.unavailable()
  }

  async fn play(&self) -> Result<()> {
    self.unavailable()
  }

  async fn pause(&self) -> Result<()> {
    self.unavailable()
  }

  async fn stop(&self) -> Result<()> {
    self.unavailable()
  }

  async fn seek(&self, _position: f64) -> Result<()> {
    self.unavailable()
  }

  async fn set_volume(&self, _volume: f64) -> Result<()> {
    self.unavailable()
  }

  async fn set_muted(&self, _muted: bool) -> Result<()> {
    self.unavailable()
  }

  async fn set_audio_track(&self, _id: i64) -> Result<()> {
    self.unavailable()
  }

  async fn set_subtitle_track(&self, _id: Option<i64>) -> Result<()> {
    self.unavailable()
  }

  fn status(&self) -> PlayerStatus {
    self.status.snapshot()
  }

  fn subscribe(&self) -> Subscription {
    self.status.subscribe()
  }

  async fn cleanup(&self) {}
}
