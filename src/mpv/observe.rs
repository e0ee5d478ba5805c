//! Observed MPV properties and how their changes map onto player status.

use serde_json::Value;

use crate::player::{RawTrack, StatusChange};

/// Observer IDs for the properties subscribed after every load.
pub const OBS_PAUSE: u64 = 1;
pub const OBS_TIME_POS: u64 = 2;
pub const OBS_DURATION: u64 = 3;
pub const OBS_VOLUME: u64 = 4;
pub const OBS_MUTE: u64 = 5;
pub const OBS_TRACK_LIST: u64 = 6;
pub const OBS_AID: u64 = 7;
pub const OBS_SID: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
  Pause,
  TimePos,
  Duration,
  Volume,
  Mute,
  TrackList,
  Aid,
  Sid,
}

impl Observed {
  pub const ALL: [Observed; 8] = [
    Observed::Pause,
    Observed::TimePos,
    Observed::Duration,
    Observed::Volume,
    Observed::Mute,
    Observed::TrackList,
    Observed::Aid,
    Observed::Sid,
  ];

  pub fn observer_id(self) -> u64 {
    match self {
      Observed::Pause => OBS_PAUSE,
      Observed::TimePos => OBS_TIME_POS,
      Observed::Duration => OBS_DURATION,
      Observed::Volume => OBS_VOLUME,
      Observed::Mute => OBS_MUTE,
      Observed::TrackList => OBS_TRACK_LIST,
      Observed::Aid => OBS_AID,
      Observed::Sid => OBS_SID,
    }
  }

  pub fn property(self) -> &'static str {
    match self {
      Observed::Pause => "pause",
      Observed::TimePos => "time-pos",
      Observed::Duration => "duration",
      Observed::Volume => "volume",
      Observed::Mute => "mute",
      Observed::TrackList => "track-list",
      Observed::Aid => "aid",
      Observed::Sid => "sid",
    }
  }

  /// Attribute a property-change event by observer ID, falling back to name.
  pub fn resolve(id: Option<u64>, name: &str) -> Option<Self> {
    id.and_then(|id| Self::ALL.into_iter().find(|o| o.observer_id() == id))
      .or_else(|| Self::ALL.into_iter().find(|o| o.property() == name))
  }
}

/// What a property change means for the status.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyUpdate {
  Status(StatusChange),
  Tracks(Vec<RawTrack>),
  /// Wrong type or unavailable; nothing to apply.
  Ignored,
}

pub fn interpret(property: Observed, data: &Value) -> PropertyUpdate {
  let change = match property {
    Observed::Pause => data.as_bool().map(StatusChange::Paused),
    Observed::TimePos => data.as_f64().map(StatusChange::Position),
    Observed::Duration => data.as_f64().map(StatusChange::Duration),
    // MPV reports 0-100.
    Observed::Volume => data.as_f64().map(|v| StatusChange::Volume(v / 100.0)),
    Observed::Mute => data.as_bool().map(StatusChange::Muted),
    Observed::Aid => track_selection(data).map(StatusChange::AudioTrack),
    Observed::Sid => track_selection(data).map(StatusChange::SubtitleTrack),
    Observed::TrackList => {
      return match parse_track_list(data) {
        Some(tracks) => PropertyUpdate::Tracks(tracks),
        None => PropertyUpdate::Ignored,
      };
    }
  };
  change.map_or(PropertyUpdate::Ignored, PropertyUpdate::Status)
}

/// `aid`/`sid` are a track ID, or `false`/`"no"` when nothing is selected.
/// `Null` means the property is unavailable and is not a selection.
fn track_selection(data: &Value) -> Option<Option<i64>> {
  match data {
    Value::Number(n) => n.as_i64().map(Some),
    Value::Bool(false) => Some(None),
    Value::String(s) if s == "no" => Some(None),
    Value::String(s) => s.parse::<i64>().ok().map(Some),
    _ => None,
  }
}

/// Parse MPV's `track-list`, skipping entries that do not fit.
pub fn parse_track_list(data: &Value) -> Option<Vec<RawTrack>> {
  let entries = data.as_array()?;
  let tracks = entries
    .iter()
    .filter_map(|entry| match serde_json::from_value::<RawTrack>(entry.clone()) {
      Ok(track) => Some(track),
      Err(e) => {
        log::debug!("Skipping malformed track entry {}: {}", entry, e);
        None
      }
    })
    .collect();
  Some(tracks)
}
