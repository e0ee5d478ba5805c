//! Player error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while driving a player backend.
#[derive(Debug, Error)]
pub enum PlayerError {
  #[error("Media file not found: {}", .0.display())]
  MediaNotFound(PathBuf),

  #[error("Failed to start player backend: {0}")]
  BackendStartFailed(String),

  #[error("Failed to connect to player control channel after {attempts} attempts: {reason}")]
  ChannelConnectFailed { attempts: u32, reason: String },

  #[error("Failed to write to player control channel: {0}")]
  ChannelWriteFailed(String),

  #[error("Player command failed: {0}")]
  CommandFailed(String),

  #[error("Player command timed out after {timeout_ms} ms (request_id={request_id})")]
  CommandTimeout { request_id: u64, timeout_ms: u64 },

  #[error("Unknown player backend: {0}")]
  UnknownBackend(String),

  #[error("No player backend available")]
  NoBackendAvailable,

  #[error("No media loaded")]
  NoMediaLoaded,

  #[error("Player control channel closed")]
  Disconnected,

  #[error("Player backend '{0}' is not available")]
  BackendUnavailable(&'static str),
}

impl PlayerError {
  /// Command-level failures are returned to the caller and also broadcast
  /// to passive observers as an `error` notification.
  pub fn is_command_failure(&self) -> bool {
    matches!(
      self,
      PlayerError::CommandFailed(_)
        | PlayerError::CommandTimeout { .. }
        | PlayerError::ChannelWriteFailed(_)
        | PlayerError::Disconnected
    )
  }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
