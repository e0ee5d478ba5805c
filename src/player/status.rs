//! Canonical playback status and its reconciliation.
//!
//! All mutations go through [`StatusStore`], which suppresses no-op writes
//! and publishes one full snapshot per mutating call. Notifications are
//! emitted while the status lock is held, so subscribers observe them in
//! the order the mutations happened.

use parking_lot::Mutex;

use super::events::{EventHub, PlayerEvent, Subscription};
use super::{MediaTracks, PlaybackState, PlayerStatus, RawTrack};

/// A single field update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusChange {
  /// Player pause flag; maps onto playing/paused.
  Paused(bool),
  Position(f64),
  Duration(f64),
  /// Normalized 0.0 - 1.0.
  Volume(f64),
  Muted(bool),
  AudioTrack(Option<i64>),
  SubtitleTrack(Option<i64>),
  State(PlaybackState),
}

/// Owner of the single live [`PlayerStatus`] of a player instance.
pub struct StatusStore {
  status: Mutex<PlayerStatus>,
  events: EventHub,
}

impl Default for StatusStore {
  fn default() -> Self {
    Self::new()
  }
}

impl StatusStore {
  pub fn new() -> Self {
    Self {
      status: Mutex::new(PlayerStatus::default()),
      events: EventHub::new(),
    }
  }

  /// Copy of the current status.
  pub fn snapshot(&self) -> PlayerStatus {
    self.status.lock().clone()
  }

  pub fn state(&self) -> PlaybackState {
    self.status.lock().state
  }

  pub fn subscribe(&self) -> Subscription {
    self.events.subscribe()
  }

  /// Apply a batch of changes. At most one `StatusChanged` is emitted.
  /// Returns whether anything changed.
  pub fn apply<I>(&self, changes: I) -> bool
  where
    I: IntoIterator<Item = StatusChange>,
  {
    let mut status = self.status.lock();
    let mut changed = false;
    for change in changes {
      changed |= apply_change(&mut status, change);
    }
    if changed {
      self.events.emit(PlayerEvent::StatusChanged(status.clone()));
    }
    changed
  }

  pub fn apply_one(&self, change: StatusChange) -> bool {
    self.apply([change])
  }

  /// Replace the track list if it structurally differs from the stored one.
  pub fn reconcile_tracks(&self, raw: &[RawTrack]) -> bool {
    let tracks = MediaTracks::from_raw(raw);
    let mut status = self.status.lock();
    if status.tracks == tracks {
      return false;
    }
    log::debug!(
      "Track list changed: {} audio, {} subtitles",
      tracks.audio.len(),
      tracks.subtitles.len()
    );
    status.tracks = tracks.clone();
    self.events.emit(PlayerEvent::TracksChanged(tracks));
    self.events.emit(PlayerEvent::StatusChanged(status.clone()));
    true
  }

  /// Apply a position read back by polling.
  ///
  /// A load whose start events were missed is promoted to `playing`. Once
  /// playback has finished or stopped the value is stale and dropped.
  pub fn reconcile_position(&self, position: f64) -> bool {
    let mut status = self.status.lock();
    let mut changed = match status.state {
      PlaybackState::Idle | PlaybackState::Stopped => return false,
      PlaybackState::Loading => apply_change(&mut status, StatusChange::State(PlaybackState::Playing)),
      PlaybackState::Playing | PlaybackState::Paused => false,
    };
    changed |= apply_change(&mut status, StatusChange::Position(position));
    if changed {
      self.events.emit(PlayerEvent::StatusChanged(status.clone()));
    }
    changed
  }

  /// Reset per-media fields and enter `loading`. Volume and mute carry over.
  pub fn begin_loading(&self) {
    let mut status = self.status.lock();
    let next = PlayerStatus {
      state: PlaybackState::Loading,
      volume: status.volume,
      is_muted: status.is_muted,
      ..PlayerStatus::default()
    };
    let tracks_changed = status.tracks != next.tracks;
    *status = next;
    if tracks_changed {
      self.events.emit(PlayerEvent::TracksChanged(status.tracks.clone()));
    }
    self.events.emit(PlayerEvent::StatusChanged(status.clone()));
  }

  /// Playback finished: go to `idle` with position 0.
  ///
  /// `ended` is raised only when media was actually playing; an explicit
  /// stop is normalized to `idle` quietly, and an already idle player is
  /// left untouched. Returns whether `ended` was raised.
  pub fn end_playback(&self) -> bool {
    let mut status = self.status.lock();
    let natural_end = match status.state {
      PlaybackState::Idle => return false,
      PlaybackState::Stopped => false,
      PlaybackState::Loading | PlaybackState::Playing | PlaybackState::Paused => true,
    };
    status.state = PlaybackState::Idle;
    status.position = 0.0;
    self.events.emit(PlayerEvent::StatusChanged(status.clone()));
    if natural_end {
      self.events.emit(PlayerEvent::Ended);
    }
    natural_end
  }

  /// Broadcast a failure to passive observers.
  pub fn report_error(&self, message: impl Into<String>) {
    let message = message.into();
    // Lock held so the error is ordered against status notifications.
    let _guard = self.status.lock();
    self.events.emit(PlayerEvent::Error(message));
  }

  /// Abort a load: back to `idle` and report why.
  pub fn fail(&self, message: impl Into<String>) {
    let mut status = self.status.lock();
    if status.state != PlaybackState::Idle {
      status.state = PlaybackState::Idle;
      status.position = 0.0;
      self.events.emit(PlayerEvent::StatusChanged(status.clone()));
    }
    self.events.emit(PlayerEvent::Error(message.into()));
  }
}

fn apply_change(status: &mut PlayerStatus, change: StatusChange) -> bool {
  match change {
    StatusChange::Paused(paused) => {
      if paused == (status.state == PlaybackState::Paused) {
        return false;
      }
      status.state = if paused {
        PlaybackState::Paused
      } else {
        PlaybackState::Playing
      };
      true
    }
    StatusChange::Position(position) => {
      if !position.is_finite() {
        return false;
      }
      let mut position = position.max(0.0);
      if status.duration > 0.0 {
        position = position.min(status.duration);
      }
      set_if_changed(&mut status.position, position)
    }
    StatusChange::Duration(duration) => {
      if !duration.is_finite() || duration < 0.0 {
        return false;
      }
      if !set_if_changed(&mut status.duration, duration) {
        return false;
      }
      if duration > 0.0 && status.position > duration {
        status.position = duration;
      }
      true
    }
    StatusChange::Volume(volume) => {
      if !volume.is_finite() {
        return false;
      }
      set_if_changed(&mut status.volume, volume.clamp(0.0, 1.0))
    }
    StatusChange::Muted(muted) => set_if_changed(&mut status.is_muted, muted),
    StatusChange::AudioTrack(id) => set_if_changed(&mut status.current_audio_track, id),
    StatusChange::SubtitleTrack(id) => set_if_changed(&mut status.current_subtitle_track, id),
    StatusChange::State(state) => set_if_changed(&mut status.state, state),
  }
}

fn set_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
  if *slot == value {
    return false;
  }
  *slot = value;
  true
}
