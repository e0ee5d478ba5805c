//! Player capability interface and the public playback model.
//!
//! Every backend (mpv, vlc, mock) implements [`MediaPlayer`]. Status is kept
//! in a [`StatusStore`] and fanned out to subscribers through an [`EventHub`].

pub mod events;
pub mod status;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use events::{EventHub, PlayerEvent, Subscription};
pub use status::{StatusChange, StatusStore};

/// Playback lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
  #[default]
  Idle,
  Loading,
  Playing,
  Paused,
  Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
  pub id: i64,
  pub title: Option<String>,
  pub language: Option<String>,
  pub codec: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrack {
  pub id: i64,
  pub title: Option<String>,
  pub language: Option<String>,
  pub codec: Option<String>,
  pub is_default: bool,
  pub is_forced: bool,
}

/// Audio and subtitle tracks of the loaded media, in player order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaTracks {
  pub audio: Vec<AudioTrack>,
  pub subtitles: Vec<SubtitleTrack>,
}

/// Track descriptor as reported by a player before filtering.
///
/// Field names follow mpv's `track-list` entries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTrack {
  pub id: i64,
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub lang: Option<String>,
  #[serde(default)]
  pub codec: Option<String>,
  #[serde(default)]
  pub default: Option<bool>,
  #[serde(default)]
  pub forced: Option<bool>,
}

impl RawTrack {
  pub fn audio(id: i64, lang: &str) -> Self {
    Self {
      id,
      kind: "audio".to_string(),
      lang: Some(lang.to_string()),
      ..Self::default()
    }
  }

  pub fn subtitle(id: i64, lang: &str) -> Self {
    Self {
      id,
      kind: "sub".to_string(),
      lang: Some(lang.to_string()),
      ..Self::default()
    }
  }
}

impl MediaTracks {
  /// Keep audio and subtitle tracks only. Duplicate ids keep the first entry.
  pub fn from_raw(raw: &[RawTrack]) -> Self {
    let mut tracks = MediaTracks::default();
    for track in raw {
      match track.kind.as_str() {
        "audio" => {
          if tracks.audio.iter().any(|a| a.id == track.id) {
            continue;
          }
          tracks.audio.push(AudioTrack {
            id: track.id,
            title: track.title.clone(),
            language: track.lang.clone(),
            codec: track.codec.clone(),
          });
        }
        "sub" | "subtitle" => {
          if tracks.subtitles.iter().any(|s| s.id == track.id) {
            continue;
          }
          tracks.subtitles.push(SubtitleTrack {
            id: track.id,
            title: track.title.clone(),
            language: track.lang.clone(),
            codec: track.codec.clone(),
            is_default: track.default.unwrap_or(false),
            is_forced: track.forced.unwrap_or(false),
          });
        }
        _ => {}
      }
    }
    tracks
  }
}

/// Canonical playback status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
  pub state: PlaybackState,
  /// Seconds.
  pub position: f64,
  /// Seconds, 0 until known.
  pub duration: f64,
  /// Normalized 0.0 - 1.0.
  pub volume: f64,
  pub is_muted: bool,
  pub current_audio_track: Option<i64>,
  pub current_subtitle_track: Option<i64>,
  pub tracks: MediaTracks,
}

impl Default for PlayerStatus {
  fn default() -> Self {
    Self {
      state: PlaybackState::Idle,
      position: 0.0,
      duration: 0.0,
      volume: 1.0,
      is_muted: false,
      current_audio_track: None,
      current_subtitle_track: None,
      tracks: MediaTracks::default(),
    }
  }
}

/// Options applied when loading media.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadOptions {
  /// Start offset in seconds.
  pub start: Option<f64>,
}

impl LoadOptions {
  pub fn start_at(seconds: f64) -> Self {
    Self {
      start: Some(seconds),
    }
  }

  /// Start offset worth passing to a player (positive and finite).
  pub fn start_offset(&self) -> Option<f64> {
    self.start.filter(|s| s.is_finite() && *s > 0.0)
  }
}

/// Player capability interface implemented by every backend.
#[async_trait]
pub trait MediaPlayer: Send + Sync {
  /// Registered backend name.
  fn name(&self) -> &'static str;

  /// Whether this backend can run on this system.
  fn is_available(&self) -> bool;

  /// Load a media file, replacing anything currently playing.
  async fn load_media(&self, path: &Path, options: LoadOptions) -> Result<()>;

  async fn play(&self) -> Result<()>;

  async fn pause(&self) -> Result<()>;

  async fn stop(&self) -> Result<()>;

  /// Seek to an absolute position in seconds, clamped to `[0, duration]`.
  async fn seek(&self, position: f64) -> Result<()>;

  /// Set volume, clamped to `[0.0, 1.0]`.
  async fn set_volume(&self, volume: f64) -> Result<()>;

  async fn set_muted(&self, muted: bool) -> Result<()>;

  async fn set_audio_track(&self, id: i64) -> Result<()>;

  /// Select a subtitle track, or disable subtitles with `None`.
  async fn set_subtitle_track(&self, id: Option<i64>) -> Result<()>;

  /// Copy of the current status.
  fn status(&self) -> PlayerStatus;

  fn tracks(&self) -> MediaTracks {
    self.status().tracks
  }

  /// Register for status/tracks/ended/error notifications.
  fn subscribe(&self) -> Subscription;

  /// Tear down any running playback. Safe to call repeatedly.
  async fn cleanup(&self);
}
