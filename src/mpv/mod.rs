//! MPV backend - spawns and controls an external MPV player via JSON IPC.
//!
//! Architecture:
//! - `process.rs` - MPV binary detection and process supervision
//! - `ipc.rs` - Async IPC channel (Named Pipes on Windows, Unix Sockets on Linux/macOS)
//! - `protocol.rs` - JSON command/response/event types
//! - `observe.rs` - Observed properties and their status mapping
//! - `player.rs` - `MediaPlayer` implementation tying it together

pub mod ipc;
pub mod observe;
pub mod player;
pub mod process;
pub mod protocol;

pub use ipc::MpvIpc;
pub use player::MpvPlayer;
pub use process::{find_mpv, resolve_mpv};
pub use protocol::{MpvCommand, MpvEvent, MpvMessage, MpvResponse};
