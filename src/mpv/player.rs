//! MPV backend: one MPV process per loaded file, controlled over JSON IPC.

use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::ipc::MpvIpc;
use super::observe::{self, Observed, PropertyUpdate};
use super::process::{resolve_mpv, unique_ipc_path, MpvProcess, SpawnRequest};
use super::protocol::{MpvCommand, MpvEvent};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::player::{
  LoadOptions, MediaPlayer, PlaybackState, PlayerStatus, StatusChange, StatusStore, Subscription,
};

pub const BACKEND_NAME: &str = "mpv";

type IpcSlot = Arc<Mutex<Option<Arc<MpvIpc>>>>;

/// Resources of the currently loaded file.
struct Session {
  process: Option<MpvProcess>,
  tasks: CancellationToken,
}

/// MPV player backend.
pub struct MpvPlayer {
  config: PlayerConfig,
  status: Arc<StatusStore>,
  ipc: IpcSlot,
  session: Mutex<Option<Session>>,
  lifecycle: tokio::sync::Mutex<()>,
}

impl MpvPlayer {
  pub fn new(config: PlayerConfig) -> Self {
    Self {
      config,
      status: Arc::new(StatusStore::new()),
      ipc: Arc::new(Mutex::new(None)),
      session: Mutex::new(None),
      lifecycle: tokio::sync::Mutex::new(()),
    }
  }

  /// Whether an MPV binary can be found for the given config.
  pub fn binary_available(config: &PlayerConfig) -> bool {
    resolve_mpv(config.mpv_executable().as_deref()).is_some()
  }

  /// Check if a control channel is open.
  pub fn is_connected(&self) -> bool {
    self.ipc.lock().is_some()
  }

  fn get_ipc(&self) -> Result<Arc<MpvIpc>> {
    self.ipc.lock().clone().ok_or(PlayerError::NoMediaLoaded)
  }

  /// Send a command; command-level failures are also broadcast.
  async fn send(&self, cmd: MpvCommand) -> Result<Value> {
    let ipc = self.get_ipc()?;
    match ipc.send_command(cmd).await {
      Ok(data) => Ok(data),
      Err(e) => {
        if e.is_command_failure() {
          self.status.report_error(e.to_string());
        }
        Err(e)
      }
    }
  }

  async fn spawn_and_connect(
    &self,
    path: &Path,
    options: LoadOptions,
  ) -> Result<(MpvProcess, oneshot::Receiver<ExitStatus>, MpvIpc)> {
    let configured = self.config.mpv_executable();
    let executable = resolve_mpv(configured.as_deref())
      .ok_or_else(|| PlayerError::BackendStartFailed("MPV executable not found".to_string()))?;

    let ipc_path = unique_ipc_path();
    let request = SpawnRequest {
      executable: &executable,
      media: path,
      ipc_path: &ipc_path,
      start: options.start_offset(),
      extra_args: &self.config.mpv_args,
    };
    let (process, exit_rx) = MpvProcess::spawn(&request)?;

    match MpvIpc::connect(
      &ipc_path,
      self.config.connect_attempts,
      self.config.connect_interval(),
      self.config.response_timeout(),
    )
    .await
    {
      Ok(ipc) => Ok((process, exit_rx, ipc)),
      Err(e) => {
        process.terminate().await;
        Err(e)
      }
    }
  }

  /// Wire a connected channel into this player: event loop, property
  /// observations, exit tracking and progress polling.
  async fn start_session(
    &self,
    ipc: MpvIpc,
    process: Option<MpvProcess>,
    exit_rx: Option<oneshot::Receiver<ExitStatus>>,
  ) {
    let ipc = Arc::new(ipc);
    let tasks = CancellationToken::new();
    *self.ipc.lock() = Some(ipc.clone());
    *self.session.lock() = Some(Session {
      process,
      tasks: tasks.clone(),
    });

    tokio::spawn(event_loop(
      ipc.clone(),
      ipc.events(),
      self.status.clone(),
      self.ipc.clone(),
      tasks.clone(),
    ));

    if let Some(exit_rx) = exit_rx {
      tokio::spawn(exit_relay(exit_rx, ipc.clone(), tasks.clone()));
    }

    observe_properties(&ipc).await;
    // A file that started before we connected has no start events to see.
    if self.status.state() == PlaybackState::Loading {
      request(&ipc, "time-pos").await;
    }

    tokio::spawn(progress_loop(
      ipc,
      self.status.clone(),
      tasks,
      self.config.progress_interval(),
    ));
  }

  /// Stop background tasks, close the channel and kill the process.
  async fn teardown(&self) {
    let session = self.session.lock().take();
    let ipc = self.ipc.lock().take();

    if let Some(session) = &session {
      session.tasks.cancel();
    }
    if let Some(ipc) = ipc {
      log::debug!("Closing MPV IPC connection");
      ipc.close();
    }
    if let Some(process) = session.and_then(|s| s.process) {
      process.terminate().await;
    }
  }
}

#[async_trait]
impl MediaPlayer for MpvPlayer {
  fn name(&self) -> &'static str {
    BACKEND_NAME
  }

  fn is_available(&self) -> bool {
    Self::binary_available(&self.config)
  }

  async fn load_media(&self, path: &Path, options: LoadOptions) -> Result<()> {
    let _lifecycle = self.lifecycle.lock().await;

    if tokio::fs::File::open(path).await.is_err() || !path.is_file() {
      return Err(PlayerError::MediaNotFound(path.to_path_buf()));
    }

    self.teardown().await;
    log::info!("Loading media: {}", path.display());
    self.status.begin_loading();

    match self.spawn_and_connect(path, options).await {
      Ok((process, exit_rx, ipc)) => {
        self.start_session(ipc, Some(process), Some(exit_rx)).await;
        Ok(())
      }
      Err(e) => {
        log::error!("Failed to load {}: {}", path.display(), e);
        self.status.fail(e.to_string());
        Err(e)
      }
    }
  }

  async fn play(&self) -> Result<()> {
    self.send(MpvCommand::set_pause(false)).await?;
    Ok(())
  }

  async fn pause(&self) -> Result<()> {
    self.send(MpvCommand::set_pause(true)).await?;
    Ok(())
  }

  async fn stop(&self) -> Result<()> {
    self.get_ipc()?;
    self.status.apply([
      StatusChange::State(PlaybackState::Stopped),
      StatusChange::Position(0.0),
    ]);
    self.send(MpvCommand::stop()).await?;
    Ok(())
  }

  async fn seek(&self, position: f64) -> Result<()> {
    let duration = self.status.snapshot().duration;
    let target = clamp_seek(position, duration);
    self.send(MpvCommand::seek(target)).await?;
    Ok(())
  }

  async fn set_volume(&self, volume: f64) -> Result<()> {
    let volume = if volume.is_finite() {
      volume.clamp(0.0, 1.0)
    } else {
      0.0
    };
    self.send(MpvCommand::set_volume(volume * 100.0)).await?;
    Ok(())
  }

  async fn set_muted(&self, muted: bool) -> Result<()> {
    self.send(MpvCommand::set_mute(muted)).await?;
    Ok(())
  }

  async fn set_audio_track(&self, id: i64) -> Result<()> {
    self.send(MpvCommand::set_audio_track(id)).await?;
    Ok(())
  }

  async fn set_subtitle_track(&self, id: Option<i64>) -> Result<()> {
    self.send(MpvCommand::set_subtitle_track(id)).await?;
    Ok(())
  }

  fn status(&self) -> PlayerStatus {
    self.status.snapshot()
  }

  fn subscribe(&self) -> Subscription {
    self.status.subscribe()
  }

  async fn cleanup(&self) {
    let _lifecycle = self.lifecycle.lock().await;
    self.teardown().await;
    self.status.apply([
      StatusChange::State(PlaybackState::Idle),
      StatusChange::Position(0.0),
    ]);
    log::info!("MPV player cleaned up");
  }
}

impl Drop for MpvPlayer {
  fn drop(&mut self) {
    if let Some(session) = self.session.get_mut().take() {
      session.tasks.cancel();
    }
    if let Some(ipc) = self.ipc.lock().take() {
      ipc.close();
    }
  }
}

/// Clamp a seek target to `[0, duration]` (upper bound only once known).
pub fn clamp_seek(position: f64, duration: f64) -> f64 {
  let position = if position.is_nan() { 0.0 } else { position.max(0.0) };
  if duration > 0.0 {
    position.min(duration)
  } else if position.is_finite() {
    position
  } else {
    0.0
  }
}

/// Subscribe to every property in [`Observed::ALL`].
async fn observe_properties(ipc: &MpvIpc) {
  let requests = Observed::ALL.map(|prop| async move {
    let result = ipc
      .send_command(MpvCommand::observe_property(prop.observer_id(), prop.property()))
      .await;
    (prop, result)
  });
  for (prop, result) in join_all(requests).await {
    if let Err(e) = result {
      log::warn!("Failed to observe {}: {}", prop.property(), e);
    }
  }
  log::debug!("Property observations set up");
}

/// How long a dead process gets for its last messages to be read.
const EXIT_DRAIN: Duration = Duration::from_millis(500);

/// Apply events in decode order until the channel closes or the session
/// is torn down. A channel that closes on its own means playback is over.
async fn event_loop(
  ipc: Arc<MpvIpc>,
  events: Receiver<MpvEvent>,
  status: Arc<StatusStore>,
  slot: IpcSlot,
  tasks: CancellationToken,
) {
  log::debug!("MPV event loop started");
  loop {
    let event = tokio::select! {
      biased;
      _ = tasks.cancelled() => break,
      event = events.recv() => event,
    };
    match event {
      Ok(event) => handle_event(&ipc, &status, event).await,
      Err(_) => {
        log::info!("MPV event channel closed");
        status.end_playback();
        release_slot(&slot, &ipc);
        break;
      }
    }
  }
  log::debug!("MPV event loop stopped");
}

async fn handle_event(ipc: &MpvIpc, status: &StatusStore, event: MpvEvent) {
  match event {
    MpvEvent::PropertyChange { id, name, data } => {
      let Some(property) = Observed::resolve(id, &name) else {
        log::debug!("Ignoring change of unobserved property {}", name);
        return;
      };
      match observe::interpret(property, &data) {
        PropertyUpdate::Status(change) => {
          status.apply_one(change);
        }
        PropertyUpdate::Tracks(tracks) => {
          status.reconcile_tracks(&tracks);
        }
        PropertyUpdate::Ignored => {
          log::debug!("Ignoring {} value {}", name, data);
        }
      }
    }
    MpvEvent::PropertyReply { name, data } => match name.as_str() {
      "time-pos" => {
        if let Some(position) = data.as_f64() {
          status.reconcile_position(position);
        }
      }
      "track-list" => match observe::parse_track_list(&data) {
        Some(tracks) => {
          status.reconcile_tracks(&tracks);
        }
        None => log::warn!("Unexpected track-list value: {}", data),
      },
      _ => log::debug!("Ignoring reply for {}", name),
    },
    MpvEvent::PlaybackRestart => {
      // MPV also restarts after a seek while paused; stay paused then.
      if status.state() != PlaybackState::Paused {
        status.apply_one(StatusChange::State(PlaybackState::Playing));
      }
    }
    // Not every build pushes the track list after load.
    MpvEvent::FileLoaded => request(ipc, "track-list").await,
    MpvEvent::EndFile { reason, error } => {
      log::info!("MPV end-file: reason={:?}", reason);
      if reason.as_deref() == Some("error") {
        let detail = error.unwrap_or_else(|| "unknown error".to_string());
        status.report_error(format!("Playback error: {}", detail));
      }
      status.end_playback();
    }
    MpvEvent::Other(name) => log::debug!("Ignoring MPV event {}", name),
  }
}

/// Query a property; the value is applied by the event loop.
async fn request(ipc: &MpvIpc, property: &str) {
  if let Err(e) = ipc.request_property(property).await {
    log::warn!("Failed to query {}: {}", property, e);
  }
}

/// On process exit, let the reader drain what MPV wrote before dying, then
/// close the channel. The event loop finishes the playback.
async fn exit_relay(
  exit_rx: oneshot::Receiver<ExitStatus>,
  ipc: Arc<MpvIpc>,
  tasks: CancellationToken,
) {
  tokio::select! {
    _ = tasks.cancelled() => {}
    exit = exit_rx => {
      if let Ok(code) = exit {
        log::info!("MPV exited ({}), playback finished", code);
        if tokio::time::timeout(EXIT_DRAIN, ipc.closed()).await.is_err() {
          log::debug!("MPV IPC still open after exit, closing");
        }
        ipc.close();
      }
    }
  }
}

/// Periodic time-pos query correcting for missed or throttled pushes.
async fn progress_loop(
  ipc: Arc<MpvIpc>,
  status: Arc<StatusStore>,
  tasks: CancellationToken,
  interval: Duration,
) {
  let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = tasks.cancelled() => break,
      _ = ticker.tick() => {}
    }
    if matches!(status.state(), PlaybackState::Idle | PlaybackState::Stopped) {
      continue;
    }
    if let Err(e) = ipc.request_property("time-pos").await {
      log::debug!("Stopping progress polling: {}", e);
      break;
    }
  }
  log::debug!("Progress polling stopped");
}

/// Clear the shared channel reference if it still points at `ipc`.
fn release_slot(slot: &IpcSlot, ipc: &Arc<MpvIpc>) {
  let mut slot = slot.lock();
  if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, ipc)) {
    *slot = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::player::PlayerEvent;
  use serde_json::json;
  use std::collections::{HashMap, HashSet};
  use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
  use tokio::sync::mpsc;

  /// Scripted stand-in for an MPV process on the far end of the channel.
  struct FakeMpv {
    commands: Arc<Mutex<Vec<Value>>>,
    properties: Arc<Mutex<HashMap<String, Value>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    push: Option<mpsc::UnboundedSender<String>>,
  }

  impl FakeMpv {
    fn start(timeout: Duration) -> (MpvIpc, FakeMpv) {
      let (client, server) = duplex(64 * 1024);
      let (cr, cw) = tokio::io::split(client);
      let ipc = MpvIpc::from_stream(cr, cw, timeout);

      let commands = Arc::new(Mutex::new(Vec::new()));
      let properties = Arc::new(Mutex::new(HashMap::new()));
      let failing = Arc::new(Mutex::new(HashSet::new()));
      let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

      let (sr, mut sw) = tokio::io::split(server);
      let task_commands = commands.clone();
      let task_properties = properties.clone();
      let task_failing = failing.clone();
      tokio::spawn(async move {
        let mut lines = BufReader::new(sr).lines();
        loop {
          let out = tokio::select! {
            line = lines.next_line() => {
              let Ok(Some(line)) = line else { break };
              let req: Value = serde_json::from_str(&line).unwrap();
              task_commands.lock().push(req["command"].clone());
              respond(&req, &task_properties, &task_failing)
            }
            pushed = push_rx.recv() => match pushed {
              Some(line) => line,
              None => break,
            },
          };
          if sw.write_all(format!("{}\n", out).as_bytes()).await.is_err() {
            break;
          }
        }
      });

      (
        ipc,
        FakeMpv {
          commands,
          properties,
          failing,
          push: Some(push_tx),
        },
      )
    }

    fn push(&self, value: Value) {
      if let Some(push) = &self.push {
        push.send(value.to_string()).unwrap();
      }
    }

    fn property_change(&self, name: &str, data: Value) {
      self.push(json!({"event": "property-change", "name": name, "data": data}));
    }

    fn commands(&self) -> Vec<Value> {
      self.commands.lock().clone()
    }

    /// Close the channel as if MPV went away.
    fn hang_up(&mut self) {
      self.push = None;
    }
  }

  fn respond(
    req: &Value,
    properties: &Mutex<HashMap<String, Value>>,
    failing: &Mutex<HashSet<String>>,
  ) -> String {
    let id = &req["request_id"];
    let command = &req["command"];
    let verb = command[0].as_str().unwrap_or_default();
    let name = command[1].as_str().unwrap_or_default();
    let reply = match verb {
      "get_property" => match properties.lock().get(name) {
        Some(data) => json!({"request_id": id, "error": "success", "data": data}),
        None => json!({"request_id": id, "error": "property unavailable"}),
      },
      "set_property" if failing.lock().contains(name) => {
        json!({"request_id": id, "error": "invalid parameter"})
      }
      _ => json!({"request_id": id, "error": "success", "data": null}),
    };
    reply.to_string()
  }

  fn test_config() -> PlayerConfig {
    PlayerConfig {
      response_timeout_ms: 1000,
      progress_interval_ms: 60_000,
      ..PlayerConfig::default()
    }
  }

  async fn attached() -> (MpvPlayer, FakeMpv) {
    let player = MpvPlayer::new(test_config());
    let (ipc, fake) = FakeMpv::start(Duration::from_millis(1000));
    player.status.begin_loading();
    player.start_session(ipc, None, None).await;
    (player, fake)
  }

  async fn attached_with_exit() -> (MpvPlayer, FakeMpv, oneshot::Sender<ExitStatus>) {
    let player = MpvPlayer::new(test_config());
    let (ipc, fake) = FakeMpv::start(Duration::from_millis(1000));
    let (exit_tx, exit_rx) = oneshot::channel();
    player.status.begin_loading();
    player.start_session(ipc, None, Some(exit_rx)).await;
    (player, fake, exit_tx)
  }

  async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(3), async {
      while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
      }
    })
    .await
    .expect("condition not reached in time");
  }

  async fn next_event(sub: &Subscription) -> PlayerEvent {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
      .await
      .expect("timed out waiting for player event")
      .expect("event hub closed")
  }

  async fn wait_for_status<F>(sub: &Subscription, pred: F) -> PlayerStatus
  where
    F: Fn(&PlayerStatus) -> bool,
  {
    loop {
      if let PlayerEvent::StatusChanged(status) = next_event(sub).await {
        if pred(&status) {
          return status;
        }
      }
    }
  }

  #[test]
  fn test_clamp_seek() {
    assert_eq!(clamp_seek(9_999_999.0, 3600.0), 3600.0);
    assert_eq!(clamp_seek(-5.0, 3600.0), 0.0);
    assert_eq!(clamp_seek(120.0, 0.0), 120.0);
    assert_eq!(clamp_seek(f64::NAN, 3600.0), 0.0);
    assert_eq!(clamp_seek(f64::INFINITY, 0.0), 0.0);
  }

  #[tokio::test]
  async fn test_play_before_load_fails_without_status_change() {
    let player = MpvPlayer::new(test_config());
    let sub = player.subscribe();
    assert!(matches!(player.play().await, Err(PlayerError::NoMediaLoaded)));
    assert!(matches!(player.seek(10.0).await, Err(PlayerError::NoMediaLoaded)));
    assert!(matches!(player.stop().await, Err(PlayerError::NoMediaLoaded)));
    assert!(sub.drain().is_empty());
  }

  #[tokio::test]
  async fn test_load_missing_file() {
    let player = MpvPlayer::new(test_config());
    let result = player
      .load_media(Path::new("/nonexistent/cinecase/movie.mkv"), LoadOptions::default())
      .await;
    assert!(matches!(result, Err(PlayerError::MediaNotFound(_))));
    assert_eq!(player.status().state, PlaybackState::Idle);
  }

  #[tokio::test]
  async fn test_observes_every_property_once() {
    let (player, fake) = attached().await;
    let observed: Vec<Value> = fake
      .commands()
      .into_iter()
      .filter(|c| c[0] == "observe_property")
      .collect();
    assert_eq!(observed.len(), Observed::ALL.len());
    for prop in Observed::ALL {
      assert!(observed
        .iter()
        .any(|c| c[1] == prop.observer_id() && c[2] == prop.property()));
    }
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_playback_lifecycle() {
    let (player, fake) = attached().await;
    let sub = player.subscribe();
    assert_eq!(player.status().state, PlaybackState::Loading);

    fake.property_change("pause", json!(false));
    fake.property_change("duration", json!(3600.0));
    fake.push(json!({"event": "playback-restart"}));
    let status = wait_for_status(&sub, |s| s.state == PlaybackState::Playing).await;
    assert_eq!(status.duration, 3600.0);

    fake.property_change("volume", json!(50.0));
    let status = wait_for_status(&sub, |s| s.volume == 0.5).await;
    assert_eq!(status.state, PlaybackState::Playing);

    fake.property_change("pause", json!(true));
    wait_for_status(&sub, |s| s.state == PlaybackState::Paused).await;

    fake.push(json!({"event": "end-file", "reason": "eof"}));
    let status = wait_for_status(&sub, |s| s.state == PlaybackState::Idle).await;
    assert_eq!(status.position, 0.0);
    assert_eq!(next_event(&sub).await, PlayerEvent::Ended);

    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_repeated_property_value_is_silent() {
    let (player, fake) = attached().await;
    let sub = player.subscribe();

    fake.property_change("time-pos", json!(12.0));
    wait_for_status(&sub, |s| s.position == 12.0).await;

    fake.property_change("time-pos", json!(12.0));
    fake.property_change("mute", json!(true));
    // The next notification must be the mute change, not a duplicate.
    match next_event(&sub).await {
      PlayerEvent::StatusChanged(status) => {
        assert!(status.is_muted);
        assert_eq!(status.position, 12.0);
      }
      other => panic!("Unexpected event {:?}", other),
    }
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_file_loaded_refreshes_tracks() {
    let (player, fake) = attached().await;
    let sub = player.subscribe();
    fake.properties.lock().insert(
      "track-list".to_string(),
      json!([
        {"id": 1, "type": "video"},
        {"id": 1, "type": "audio", "lang": "jpn"},
        {"id": 1, "type": "sub", "lang": "eng", "forced": true}
      ]),
    );

    fake.push(json!({"event": "file-loaded"}));
    match next_event(&sub).await {
      PlayerEvent::TracksChanged(tracks) => {
        assert_eq!(tracks.audio.len(), 1);
        assert_eq!(tracks.subtitles.len(), 1);
        assert!(tracks.subtitles[0].is_forced);
      }
      other => panic!("Expected tracks change, got {:?}", other),
    }
    assert!(matches!(next_event(&sub).await, PlayerEvent::StatusChanged(_)));
    assert_eq!(player.tracks().audio[0].language.as_deref(), Some("jpn"));

    // Same list pushed by observation: nothing new.
    fake.property_change(
      "track-list",
      json!([
        {"id": 1, "type": "audio", "lang": "jpn"},
        {"id": 1, "type": "sub", "lang": "eng", "forced": true}
      ]),
    );
    fake.property_change("sid", json!(1));
    let status = wait_for_status(&sub, |_| true).await;
    assert_eq!(status.current_subtitle_track, Some(1));

    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_commands_are_translated() {
    let (player, fake) = attached().await;
    let sub = player.subscribe();
    fake.property_change("duration", json!(3600.0));
    wait_for_status(&sub, |s| s.duration == 3600.0).await;

    player.set_volume(1.7).await.unwrap();
    player.set_volume(-0.5).await.unwrap();
    player.seek(9_999_999.0).await.unwrap();
    player.pause().await.unwrap();
    player.set_subtitle_track(None).await.unwrap();
    player.set_muted(true).await.unwrap();

    let commands = fake.commands();
    assert!(commands.contains(&json!(["set_property", "volume", 100.0])));
    assert!(commands.contains(&json!(["set_property", "volume", 0.0])));
    assert!(commands.contains(&json!(["seek", 3600.0, "absolute"])));
    assert!(commands.contains(&json!(["set_property", "pause", true])));
    assert!(commands.contains(&json!(["set_property", "sid", "no"])));
    assert!(commands.contains(&json!(["set_property", "mute", true])));
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_failed_command_is_returned_and_broadcast() {
    let (player, fake) = attached().await;
    fake.failing.lock().insert("aid".to_string());
    let sub = player.subscribe();

    let result = player.set_audio_track(99).await;
    assert!(matches!(result, Err(PlayerError::CommandFailed(ref r)) if r == "invalid parameter"));
    match next_event(&sub).await {
      PlayerEvent::Error(message) => assert!(message.contains("invalid parameter")),
      other => panic!("Expected error event, got {:?}", other),
    }
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_explicit_stop_does_not_raise_ended() {
    let (player, fake) = attached().await;
    let sub = player.subscribe();
    fake.push(json!({"event": "playback-restart"}));
    wait_for_status(&sub, |s| s.state == PlaybackState::Playing).await;

    player.stop().await.unwrap();
    fake.push(json!({"event": "end-file", "reason": "stop"}));
    fake.property_change("mute", json!(true));

    let mut seen = Vec::new();
    loop {
      let event = next_event(&sub).await;
      let muted = matches!(&event, PlayerEvent::StatusChanged(s) if s.is_muted);
      seen.push(event);
      if muted {
        break;
      }
    }
    assert!(!seen.contains(&PlayerEvent::Ended));
    assert!(seen
      .iter()
      .any(|e| matches!(e, PlayerEvent::StatusChanged(s) if s.state == PlaybackState::Stopped)));
    assert_eq!(player.status().state, PlaybackState::Idle);
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_channel_close_clears_connection() {
    let (player, mut fake) = attached().await;
    assert!(player.is_connected());
    fake.hang_up();

    eventually(|| !player.is_connected()).await;
    assert_eq!(player.status().state, PlaybackState::Idle);
    assert!(matches!(player.play().await, Err(PlayerError::NoMediaLoaded)));
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_cleanup_is_idempotent() {
    let player = MpvPlayer::new(test_config());
    player.cleanup().await;
    player.cleanup().await;

    let (player, _fake) = attached().await;
    player.cleanup().await;
    player.cleanup().await;
    assert!(!player.is_connected());
    assert_eq!(player.status().state, PlaybackState::Idle);
  }

  #[tokio::test]
  async fn test_load_starting_mid_playback_is_promoted() {
    let player = MpvPlayer::new(test_config());
    let (ipc, fake) = FakeMpv::start(Duration::from_millis(1000));
    fake.properties.lock().insert("time-pos".to_string(), json!(42.0));
    let sub = player.subscribe();

    player.status.begin_loading();
    player.start_session(ipc, None, None).await;

    let status = wait_for_status(&sub, |s| s.state == PlaybackState::Playing).await;
    assert_eq!(status.position, 42.0);
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_playback_restart_keeps_pause_after_seek() {
    let (player, fake) = attached().await;
    let sub = player.subscribe();

    fake.push(json!({"event": "playback-restart"}));
    wait_for_status(&sub, |s| s.state == PlaybackState::Playing).await;
    fake.property_change("pause", json!(true));
    wait_for_status(&sub, |s| s.state == PlaybackState::Paused).await;

    fake.push(json!({"event": "playback-restart"}));
    fake.property_change("mute", json!(true));
    let status = wait_for_status(&sub, |s| s.is_muted).await;
    assert_eq!(status.state, PlaybackState::Paused);

    fake.property_change("pause", json!(false));
    wait_for_status(&sub, |s| s.state == PlaybackState::Playing).await;
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_polled_position_is_applied_in_decode_order() {
    let (player, fake) = attached().await;
    let sub = player.subscribe();
    fake.push(json!({"event": "playback-restart"}));
    fake.property_change("time-pos", json!(20.0));
    wait_for_status(&sub, |s| s.position == 20.0).await;

    // A stale value is answered before the next push.
    fake.properties.lock().insert("time-pos".to_string(), json!(5.0));
    request(&player.get_ipc().unwrap(), "time-pos").await;
    eventually(|| {
      fake
        .commands()
        .iter()
        .filter(|c| **c == json!(["get_property", "time-pos"]))
        .count()
        == 2
    })
    .await;
    fake.property_change("time-pos", json!(30.0));
    fake.property_change("mute", json!(true));

    let status = wait_for_status(&sub, |s| s.is_muted).await;
    assert_eq!(status.position, 30.0);
    player.cleanup().await;
  }

  #[tokio::test]
  async fn test_end_file_error_is_broadcast_once() {
    let (player, fake) = attached().await;
    let sub = player.subscribe();
    fake.push(json!({"event": "playback-restart"}));
    wait_for_status(&sub, |s| s.state == PlaybackState::Playing).await;

    fake.push(json!({"event": "end-file", "reason": "error", "file_error": "unrecognized file format"}));
    match next_event(&sub).await {
      PlayerEvent::Error(message) => assert!(message.contains("unrecognized file format")),
      other => panic!("Expected error event, got {:?}", other),
    }
    let status = wait_for_status(&sub, |s| s.state == PlaybackState::Idle).await;
    assert_eq!(status.position, 0.0);
    assert_eq!(next_event(&sub).await, PlayerEvent::Ended);
    player.cleanup().await;
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_process_exit_ends_playback() {
    use std::os::unix::process::ExitStatusExt;

    let (player, fake, exit_tx) = attached_with_exit().await;
    let sub = player.subscribe();
    fake.push(json!({"event": "playback-restart"}));
    wait_for_status(&sub, |s| s.state == PlaybackState::Playing).await;

    exit_tx.send(ExitStatus::from_raw(0)).unwrap();
    eventually(|| !player.is_connected()).await;

    let events = sub.drain();
    assert_eq!(events.iter().filter(|e| **e == PlayerEvent::Ended).count(), 1);
    let status = player.status();
    assert_eq!(status.state, PlaybackState::Idle);
    assert_eq!(status.position, 0.0);
    assert!(matches!(player.play().await, Err(PlayerError::NoMediaLoaded)));
    player.cleanup().await;
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_events_written_before_exit_are_applied() {
    use std::os::unix::process::ExitStatusExt;

    let (player, mut fake, exit_tx) = attached_with_exit().await;
    let sub = player.subscribe();
    fake.push(json!({"event": "playback-restart"}));
    wait_for_status(&sub, |s| s.state == PlaybackState::Playing).await;

    fake.push(json!({"event": "end-file", "reason": "error", "file_error": "demuxer error"}));
    fake.hang_up();
    exit_tx.send(ExitStatus::from_raw(256)).unwrap();
    eventually(|| !player.is_connected()).await;

    let events = sub.drain();
    let errors: Vec<&PlayerEvent> = events
      .iter()
      .filter(|e| matches!(e, PlayerEvent::Error(_)))
      .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(events.iter().filter(|e| **e == PlayerEvent::Ended).count(), 1);
    assert_eq!(player.status().state, PlaybackState::Idle);
    player.cleanup().await;
  }
}
