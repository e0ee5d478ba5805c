//! MPV JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc
//!
//! Outbound: `{"command": [...], "request_id": N}`.
//! Inbound: `{"request_id": N, "error": "success"|reason, "data": ...}` or
//! `{"event": name, ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PlayerError;

/// Command to send to MPV. The request ID is assigned when it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct MpvCommand {
  pub args: Vec<Value>,
}

impl MpvCommand {
  pub fn new(args: Vec<Value>) -> Self {
    Self { args }
  }

  /// Seek to absolute position in seconds.
  pub fn seek(time: f64) -> Self {
    Self::new(vec!["seek".into(), time.into(), "absolute".into()])
  }

  /// Set pause state.
  pub fn set_pause(paused: bool) -> Self {
    Self::set_property("pause", paused.into())
  }

  /// Set volume (0-100).
  pub fn set_volume(volume: f64) -> Self {
    Self::set_property("volume", volume.into())
  }

  pub fn set_mute(muted: bool) -> Self {
    Self::set_property("mute", muted.into())
  }

  /// Set audio track by ID.
  pub fn set_audio_track(id: i64) -> Self {
    Self::set_property("aid", id.into())
  }

  /// Set subtitle track by ID, `None` disables subtitles.
  pub fn set_subtitle_track(id: Option<i64>) -> Self {
    match id {
      Some(id) => Self::set_property("sid", id.into()),
      None => Self::set_property("sid", "no".into()),
    }
  }

  pub fn set_property(name: &str, value: Value) -> Self {
    Self::new(vec!["set_property".into(), name.into(), value])
  }

  /// Observe a property for changes.
  pub fn observe_property(id: u64, name: &str) -> Self {
    Self::new(vec!["observe_property".into(), id.into(), name.into()])
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::new(vec!["get_property".into(), name.into()])
  }

  /// Stop playback (ends the current file).
  pub fn stop() -> Self {
    Self::new(vec!["stop".into()])
  }

  /// Serialize as one wire line (without the trailing newline).
  pub fn to_line(&self, request_id: u64) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
      command: &self.args,
      request_id,
    })
  }
}

#[derive(Serialize)]
struct Envelope<'a> {
  command: &'a [Value],
  request_id: u64,
}

/// Response from MPV for a command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MpvResponse {
  /// Matching request ID.
  pub request_id: u64,
  /// "success" or error message.
  #[serde(default)]
  pub error: Option<String>,
  /// Response data (command-specific).
  #[serde(default)]
  pub data: Option<Value>,
}

impl MpvResponse {
  /// A missing error field counts as success.
  pub fn is_success(&self) -> bool {
    matches!(self.error.as_deref(), None | Some("success"))
  }

  /// Resolve to the payload, or `CommandFailed` with MPV's reason.
  pub fn into_result(self) -> Result<Value, PlayerError> {
    if self.is_success() {
      Ok(self.data.unwrap_or(Value::Null))
    } else {
      Err(PlayerError::CommandFailed(self.error.unwrap_or_default()))
    }
  }
}

/// Asynchronous event pushed by MPV.
#[derive(Debug, Clone, PartialEq)]
pub enum MpvEvent {
  /// Observed property changed. `data` is `Null` when unavailable.
  PropertyChange {
    id: Option<u64>,
    name: String,
    data: Value,
  },
  /// Playback (re)started after load or seek.
  PlaybackRestart,
  /// File opened and demuxed; tracks are known.
  FileLoaded,
  /// Current file ended.
  EndFile {
    reason: Option<String>,
    error: Option<String>,
  },
  /// Any other event name.
  Other(String),
  /// Value returned for a [`MpvIpc::request_property`] query.
  ///
  /// [`MpvIpc::request_property`]: super::ipc::MpvIpc::request_property
  PropertyReply { name: String, data: Value },
}

#[derive(Deserialize)]
struct RawEvent {
  event: String,
  #[serde(default)]
  id: Option<u64>,
  #[serde(default)]
  name: Option<String>,
  #[serde(default)]
  data: Option<Value>,
  #[serde(default)]
  reason: Option<String>,
  #[serde(default)]
  file_error: Option<String>,
}

impl From<RawEvent> for MpvEvent {
  fn from(raw: RawEvent) -> Self {
    match raw.event.as_str() {
      "property-change" => MpvEvent::PropertyChange {
        id: raw.id,
        name: raw.name.unwrap_or_default(),
        data: raw.data.unwrap_or(Value::Null),
      },
      "playback-restart" => MpvEvent::PlaybackRestart,
      "file-loaded" => MpvEvent::FileLoaded,
      "end-file" => MpvEvent::EndFile {
        reason: raw.reason,
        error: raw.file_error,
      },
      _ => MpvEvent::Other(raw.event),
    }
  }
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum MpvMessage {
  Response(MpvResponse),
  Event(MpvEvent),
  /// Valid JSON of neither shape.
  Unrecognized(Value),
}

impl MpvMessage {
  /// Parse and classify one JSON line from MPV.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;

    if value.get("request_id").is_some_and(Value::is_u64) {
      return Ok(MpvMessage::Response(serde_json::from_value(value)?));
    }
    if value.get("event").is_some_and(Value::is_string) {
      let raw: RawEvent = serde_json::from_value(value)?;
      return Ok(MpvMessage::Event(raw.into()));
    }
    Ok(MpvMessage::Unrecognized(value))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_command_serialization() {
    let line = MpvCommand::seek(12.5).to_line(7).unwrap();
    let value: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["command"], serde_json::json!(["seek", 12.5, "absolute"]));
    assert_eq!(value["request_id"], 7);
    assert!(!line.contains('\n'));
  }

  #[test]
  fn test_disable_subtitles_command() {
    let cmd = MpvCommand::set_subtitle_track(None);
    assert_eq!(cmd.args, vec![Value::from("set_property"), "sid".into(), "no".into()]);
  }

  #[test]
  fn test_response_parsing() {
    let json = r#"{"error":"success","data":null,"request_id":1}"#;
    match MpvMessage::parse(json).unwrap() {
      MpvMessage::Response(r) => {
        assert!(r.is_success());
        assert_eq!(r.request_id, 1);
      }
      other => panic!("Expected response, got {:?}", other),
    }
  }

  #[test]
  fn test_error_response_becomes_command_failed() {
    let json = r#"{"request_id":4,"error":"property unavailable"}"#;
    let MpvMessage::Response(response) = MpvMessage::parse(json).unwrap() else {
      panic!("Expected response");
    };
    match response.into_result() {
      Err(PlayerError::CommandFailed(reason)) => assert_eq!(reason, "property unavailable"),
      other => panic!("Expected CommandFailed, got {:?}", other),
    }
  }

  #[test]
  fn test_response_without_error_field_succeeds() {
    let json = r#"{"request_id":9,"data":42.0}"#;
    let MpvMessage::Response(response) = MpvMessage::parse(json).unwrap() else {
      panic!("Expected response");
    };
    assert_eq!(response.into_result().unwrap(), serde_json::json!(42.0));
  }

  #[test]
  fn test_property_change_parsing() {
    let json = r#"{"event":"property-change","id":1,"name":"pause","data":false}"#;
    match MpvMessage::parse(json).unwrap() {
      MpvMessage::Event(MpvEvent::PropertyChange { id, name, data }) => {
        assert_eq!(id, Some(1));
        assert_eq!(name, "pause");
        assert_eq!(data, Value::Bool(false));
      }
      other => panic!("Expected property change, got {:?}", other),
    }
  }

  #[test]
  fn test_property_change_without_data() {
    let json = r#"{"event":"property-change","id":3,"name":"duration"}"#;
    let msg = MpvMessage::parse(json).unwrap();
    assert_eq!(
      msg,
      MpvMessage::Event(MpvEvent::PropertyChange {
        id: Some(3),
        name: "duration".to_string(),
        data: Value::Null,
      })
    );
  }

  #[test]
  fn test_lifecycle_events() {
    assert_eq!(
      MpvMessage::parse(r#"{"event":"playback-restart"}"#).unwrap(),
      MpvMessage::Event(MpvEvent::PlaybackRestart)
    );
    assert_eq!(
      MpvMessage::parse(r#"{"event":"file-loaded"}"#).unwrap(),
      MpvMessage::Event(MpvEvent::FileLoaded)
    );
    assert_eq!(
      MpvMessage::parse(r#"{"event":"end-file","reason":"eof","playlist_entry_id":1}"#).unwrap(),
      MpvMessage::Event(MpvEvent::EndFile {
        reason: Some("eof".to_string()),
        error: None,
      })
    );
    assert_eq!(
      MpvMessage::parse(r#"{"event":"seek"}"#).unwrap(),
      MpvMessage::Event(MpvEvent::Other("seek".to_string()))
    );
  }

  #[test]
  fn test_unrecognized_shape() {
    let msg = MpvMessage::parse(r#"{"hello":"world"}"#).unwrap();
    assert!(matches!(msg, MpvMessage::Unrecognized(_)));
  }

  #[test]
  fn test_malformed_line_is_error() {
    assert!(MpvMessage::parse(r#"{"event":"file-loaded""#).is_err());
  }
}
