//! In-memory backend for tests and machines without a player binary.
//!
//! Behaves like a player that starts instantly and never fails. Playback
//! does not advance on its own; tests drive it with the `simulate_*` hooks.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{PlayerError, Result};
use crate::player::{
  LoadOptions, MediaPlayer, PlaybackState, PlayerStatus, RawTrack, StatusChange, StatusStore,
  Subscription,
};

pub const BACKEND_NAME: &str = "mock";

/// Duration reported for every loaded file unless overridden.
pub const DEFAULT_DURATION: f64 = 3600.0;

pub struct MockPlayer {
  status: StatusStore,
  duration: f64,
  media: Mutex<Option<PathBuf>>,
}

impl Default for MockPlayer {
  fn default() -> Self {
    Self::new()
  }
}

impl MockPlayer {
  pub fn new() -> Self {
    Self::with_duration(DEFAULT_DURATION)
  }

  pub fn with_duration(duration: f64) -> Self {
    Self {
      status: StatusStore::new(),
      duration,
      media: Mutex::new(None),
    }
  }

  /// Path of the loaded file, if any.
  pub fn media(&self) -> Option<PathBuf> {
    self.media.lock().clone()
  }

  fn ensure_loaded(&self) -> Result<()> {
    if self.media.lock().is_none() {
      return Err(PlayerError::NoMediaLoaded);
    }
    Ok(())
  }

  /// Pretend the file played to the end.
  pub fn simulate_end_of_file(&self) -> bool {
    self.status.end_playback()
  }

  /// Pretend the player reported this track list.
  pub fn simulate_track_list(&self, tracks: &[RawTrack]) -> bool {
    self.status.reconcile_tracks(tracks)
  }

  /// Pretend the player reported a time position.
  pub fn simulate_position(&self, position: f64) -> bool {
    self.status.apply_one(StatusChange::Position(position))
  }

  /// Pretend the player reported a (new) duration.
  pub fn simulate_property_duration(&self, duration: f64) -> bool {
    self.status.apply_one(StatusChange::Duration(duration))
  }
}

#[async_trait]
impl MediaPlayer for MockPlayer {
  fn name(&self) -> &'static str {
    BACKEND_NAME
  }

  fn is_available(&self) -> bool {
    true
  }

  async fn load_media(&self, path: &Path, options: LoadOptions) -> Result<()> {
    self.cleanup().await;
    log::info!("Mock loading media: {}", path.display());
    self.status.begin_loading();
    *self.media.lock() = Some(path.to_path_buf());

    let start = options.start_offset().unwrap_or(0.0);
    self.status.apply([
      StatusChange::Duration(self.duration),
      StatusChange::Position(start),
      StatusChange::State(PlaybackState::Playing),
    ]);
    Ok(())
  }

  async fn play(&self) -> Result<()> {
    self.ensure_loaded()?;
    self.status.apply_one(StatusChange::Paused(false));
    Ok(())
  }

  async fn pause(&self) -> Result<()> {
    self.ensure_loaded()?;
    self.status.apply_one(StatusChange::Paused(true));
    Ok(())
  }

  async fn stop(&self) -> Result<()> {
    self.ensure_loaded()?;
    self.status.apply([
      StatusChange::State(PlaybackState::Stopped),
      StatusChange::Position(0.0),
    ]);
    self.status.end_playback();
    Ok(())
  }

  async fn seek(&self, position: f64) -> Result<()> {
    self.ensure_loaded()?;
    let position = if position.is_nan() { 0.0 } else { position };
    self.status.apply_one(StatusChange::Position(position));
    Ok(())
  }

  async fn set_volume(&self, volume: f64) -> Result<()> {
    self.ensure_loaded()?;
    self.status.apply_one(StatusChange::Volume(volume));
    Ok(())
  }

  async fn set_muted(&self, muted: bool) -> Result<()> {
    self.ensure_loaded()?;
    self.status.apply_one(StatusChange::Muted(muted));
    Ok(())
  }

  async fn set_audio_track(&self, id: i64) -> Result<()> {
    self.ensure_loaded()?;
    self.status.apply_one(StatusChange::AudioTrack(Some(id)));
    Ok(())
  }

  async fn set_subtitle_track(&self, id: Option<i64>) -> Result<()> {
    self.ensure_loaded()?;
    self.status.apply_one(StatusChange::SubtitleTrack(id));
    Ok(())
  }

  fn status(&self) -> PlayerStatus {
    self.status.snapshot()
  }

  fn subscribe(&self) -> Subscription {
    self.status.subscribe()
  }

  async fn cleanup(&self) {
    if self.media.lock().take().is_some() {
      log::debug!("Mock player cleaned up");
    }
    self.status.apply([
      StatusChange::State(PlaybackState::Idle),
      StatusChange::Position(0.0),
    ]);
  }
}
