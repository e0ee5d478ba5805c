//! Async IPC connection to MPV.
//!
//! Handles platform-specific socket/pipe connections, request/response
//! matching by `request_id`, and forwarding of asynchronous events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::protocol::{MpvCommand, MpvEvent, MpvMessage, MpvResponse};
use crate::error::{PlayerError, Result};

/// Where the response to a request goes.
enum PendingRequest {
  /// A caller awaiting `send_command`.
  Caller(oneshot::Sender<Result<MpvResponse>>),
  /// A `get_property` whose value is delivered on the event stream.
  Routed(String),
}

/// IPC connection state shared between writer and reader.
#[derive(Default)]
struct IpcState {
  pending: HashMap<u64, PendingRequest>,
  closed: bool,
}

impl IpcState {
  /// Drop every pending request; waiting callers observe `Disconnected`.
  fn close(&mut self) {
    self.closed = true;
    self.pending.clear();
  }
}

/// Writer channel message.
enum WriteMessage {
  Command { request_id: u64, line: String },
  Close,
}

/// MPV IPC connection.
pub struct MpvIpc {
  state: Arc<Mutex<IpcState>>,
  next_request_id: AtomicU64,
  timeout: Duration,
  write_tx: Sender<WriteMessage>,
  event_rx: Receiver<MpvEvent>,
  shutdown: CancellationToken,
  reader_done: CancellationToken,
}

impl MpvIpc {
  /// Connect to MPV IPC socket/pipe, retrying while MPV creates it.
  pub async fn connect(
    path: &str,
    attempts: u32,
    interval: Duration,
    timeout: Duration,
  ) -> Result<Self> {
    let mut last_error = String::from("no attempt made");

    for attempt in 0..attempts {
      if attempt > 0 {
        tokio::time::sleep(interval).await;
      }

      match Self::try_connect(path, timeout).await {
        Ok(ipc) => {
          log::info!("Connected to MPV IPC at {} (attempt {})", path, attempt + 1);
          return Ok(ipc);
        }
        Err(e) => {
          log::debug!("IPC connect attempt {} failed: {}", attempt + 1, e);
          last_error = e.to_string();
        }
      }
    }

    Err(PlayerError::ChannelConnectFailed {
      attempts,
      reason: last_error,
    })
  }

  #[cfg(windows)]
  async fn try_connect(path: &str, timeout: Duration) -> std::io::Result<Self> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let client = ClientOptions::new().open(path)?;
    let (reader, writer) = tokio::io::split(client);
    Ok(Self::from_stream(reader, writer, timeout))
  }

  #[cfg(not(windows))]
  async fn try_connect(path: &str, timeout: Duration) -> std::io::Result<Self> {
    use tokio::net::UnixStream;

    let stream = UnixStream::connect(path).await?;
    let (reader, writer) = tokio::io::split(stream);
    Ok(Self::from_stream(reader, writer, timeout))
  }

  /// Run the protocol over an already-open byte stream.
  pub fn from_stream<R, W>(reader: R, writer: W, timeout: Duration) -> Self
  where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
  {
    let state = Arc::new(Mutex::new(IpcState::default()));
    let shutdown = CancellationToken::new();
    let reader_done = CancellationToken::new();

    let (event_tx, event_rx) = async_channel::unbounded();
    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();

    let reader_state = state.clone();
    let reader_shutdown = shutdown.clone();
    let done = reader_done.clone();
    tokio::spawn(async move {
      Self::reader_loop(reader, reader_state, event_tx, reader_shutdown).await;
      done.cancel();
    });

    let writer_state = state.clone();
    tokio::spawn(async move {
      Self::writer_loop(writer, write_rx, writer_state).await;
    });

    Self {
      state,
      next_request_id: AtomicU64::new(1),
      timeout,
      write_tx,
      event_rx,
      shutdown,
      reader_done,
    }
  }

  async fn reader_loop<R: tokio::io::AsyncRead + Unpin>(
    reader: R,
    state: Arc<Mutex<IpcState>>,
    event_tx: Sender<MpvEvent>,
    shutdown: CancellationToken,
  ) {
    log::debug!("MPV IPC reader loop started");
    let mut buf_reader = BufReader::new(reader);
    // Raw bytes: MPV passes through tags and filenames that are not UTF-8.
    let mut line = Vec::new();

    loop {
      line.clear();
      let read = tokio::select! {
        _ = shutdown.cancelled() => {
          log::debug!("MPV IPC reader shutdown requested");
          break;
        }
        read = buf_reader.read_until(b'\n', &mut line) => read,
      };

      match read {
        Ok(0) => {
          log::info!("MPV IPC connection closed");
          break;
        }
        Ok(_) => {
          let text = String::from_utf8_lossy(&line);
          let trimmed = text.trim();
          if trimmed.is_empty() {
            continue;
          }
          Self::dispatch(trimmed, &state, &event_tx).await;
        }
        Err(e) => {
          log::error!("MPV IPC read error: {}", e);
          break;
        }
      }
    }

    state.lock().close();
  }

  async fn dispatch(line: &str, state: &Mutex<IpcState>, event_tx: &Sender<MpvEvent>) {
    match MpvMessage::parse(line) {
      Ok(MpvMessage::Response(response)) => {
        let pending = state.lock().pending.remove(&response.request_id);
        match pending {
          Some(PendingRequest::Caller(tx)) => {
            log::debug!("MPV response for request_id={}", response.request_id);
            let _ = tx.send(Ok(response));
          }
          Some(PendingRequest::Routed(name)) => match response.into_result() {
            Ok(data) => {
              let _ = event_tx.send(MpvEvent::PropertyReply { name, data }).await;
            }
            Err(e) => log::debug!("Query of {} failed: {}", name, e),
          },
          None => {
            log::debug!(
              "Ignoring MPV response for unknown request_id={}",
              response.request_id
            );
          }
        }
      }
      Ok(MpvMessage::Event(event)) => {
        log::debug!("MPV event: {:?}", event);
        let _ = event_tx.send(event).await;
      }
      Ok(MpvMessage::Unrecognized(value)) => {
        log::warn!("Ignoring unrecognized MPV message: {}", value);
      }
      Err(e) => {
        log::warn!("Failed to parse MPV message: {} - {}", e, line);
      }
    }
  }

  async fn writer_loop<W: tokio::io::AsyncWrite + Unpin>(
    mut writer: W,
    write_rx: Receiver<WriteMessage>,
    state: Arc<Mutex<IpcState>>,
  ) {
    log::debug!("MPV IPC writer loop started");

    while let Ok(msg) = write_rx.recv().await {
      match msg {
        WriteMessage::Command { request_id, line } => {
          if let Err(e) = Self::write_line(&mut writer, &line).await {
            log::error!("MPV IPC write error: {}", e);
            let mut state = state.lock();
            if let Some(PendingRequest::Caller(tx)) = state.pending.remove(&request_id) {
              let _ = tx.send(Err(PlayerError::ChannelWriteFailed(e.to_string())));
            }
            state.close();
            break;
          }
        }
        WriteMessage::Close => {
          log::debug!("MPV IPC writer closing");
          let _ = writer.shutdown().await;
          break;
        }
      }
    }
  }

  async fn write_line<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    line: &str,
  ) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
  }

  /// Register a request and queue it for writing.
  async fn submit(&self, cmd: MpvCommand, pending: PendingRequest) -> Result<u64> {
    let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
    let line = cmd
      .to_line(request_id)
      .map_err(|e| PlayerError::ChannelWriteFailed(e.to_string()))?;

    {
      let mut state = self.state.lock();
      if state.closed {
        return Err(PlayerError::ChannelWriteFailed("channel closed".to_string()));
      }
      state.pending.insert(request_id, pending);
    }

    log::debug!("Sending MPV command: {}", line);
    if self
      .write_tx
      .send(WriteMessage::Command { request_id, line })
      .await
      .is_err()
    {
      self.state.lock().pending.remove(&request_id);
      return Err(PlayerError::ChannelWriteFailed("channel closed".to_string()));
    }
    Ok(request_id)
  }

  /// Send a command and wait for its response payload.
  pub async fn send_command(&self, cmd: MpvCommand) -> Result<Value> {
    let (tx, rx) = oneshot::channel();
    let request_id = self.submit(cmd, PendingRequest::Caller(tx)).await?;

    match tokio::time::timeout(self.timeout, rx).await {
      Ok(Ok(result)) => result?.into_result(),
      Ok(Err(_)) => Err(PlayerError::Disconnected),
      Err(_) => {
        self.state.lock().pending.remove(&request_id);
        log::warn!(
          "MPV command timeout after {} ms, request_id={}",
          self.timeout.as_millis(),
          request_id
        );
        Err(PlayerError::CommandTimeout {
          request_id,
          timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        })
      }
    }
  }

  /// Query a property without waiting for it.
  ///
  /// The value arrives on the event stream as [`MpvEvent::PropertyReply`],
  /// ordered with pushed events by when its response was decoded. A failed
  /// query is logged and produces nothing.
  pub async fn request_property(&self, name: &str) -> Result<()> {
    self
      .submit(
        MpvCommand::get_property(name),
        PendingRequest::Routed(name.to_string()),
      )
      .await?;
    Ok(())
  }

  /// Get the event receiver for property changes and other events.
  pub fn events(&self) -> Receiver<MpvEvent> {
    self.event_rx.clone()
  }

  pub fn pending_count(&self) -> usize {
    self.state.lock().pending.len()
  }

  pub fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  /// Resolves once the reader has stopped, after its last event was queued.
  pub async fn closed(&self) {
    self.reader_done.cancelled().await;
  }

  /// Close the connection and abandon pending requests.
  pub fn close(&self) {
    self.state.lock().close();
    let _ = self.write_tx.try_send(WriteMessage::Close);
    self.shutdown.cancel();
  }
}

impl Drop for MpvIpc {
  fn drop(&mut self) {
    self.close();
  }
}
