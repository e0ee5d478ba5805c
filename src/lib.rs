//! Player backend core: external media players driven over a local JSON
//! IPC channel, reconciled into one canonical playback status.

pub mod config;
pub mod error;
pub mod factory;
pub mod mock;
pub mod mpv;
pub mod player;
pub mod vlc;

pub use config::{ConfigError, PlayerConfig};
pub use error::{PlayerError, Result};
pub use factory::{BackendEntry, PlayerFactory};
pub use mock::MockPlayer;
pub use mpv::MpvPlayer;
pub use player::{
  AudioTrack, LoadOptions, MediaPlayer, MediaTracks, PlaybackState, PlayerEvent, PlayerStatus,
  SubtitleTrack, Subscription,
};
pub use vlc::VlcPlayer;
