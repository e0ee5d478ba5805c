//! MPV process detection, spawning and supervision.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PlayerError, Result};

const SOCKET_PREFIX: &str = "cinecase-mpv";

/// Generate a fresh IPC socket/pipe address for one MPV process.
///
/// Millisecond timestamp plus a random suffix, so concurrent players never
/// collide.
pub fn unique_ipc_path() -> String {
  let millis = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or_default();
  let suffix = uuid::Uuid::new_v4().simple().to_string();
  let name = format!("{}-{}-{}", SOCKET_PREFIX, millis, &suffix[..8]);

  #[cfg(windows)]
  {
    format!(r"\\.\pipe\{}", name)
  }
  #[cfg(not(windows))]
  {
    std::env::temp_dir()
      .join(format!("{}.sock", name))
      .to_string_lossy()
      .into_owned()
  }
}

/// Find MPV executable in common locations.
pub fn find_mpv() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mpv") {
    return Some(path);
  }

  #[cfg(windows)]
  let common_paths: &[&str] = &[
    r"C:\Program Files\mpv\mpv.exe",
    r"C:\Program Files (x86)\mpv\mpv.exe",
    r"C:\mpv\mpv.exe",
  ];

  #[cfg(target_os = "macos")]
  let common_paths: &[&str] = &[
    "/usr/local/bin/mpv",
    "/opt/homebrew/bin/mpv",
    "/Applications/mpv.app/Contents/MacOS/mpv",
  ];

  #[cfg(not(any(windows, target_os = "macos")))]
  let common_paths: &[&str] = &["/usr/bin/mpv", "/usr/local/bin/mpv"];

  common_paths.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Resolve the executable to run: configured override first, then discovery.
pub fn resolve_mpv(configured: Option<&Path>) -> Option<PathBuf> {
  match configured {
    Some(path) if path.is_file() => Some(path.to_path_buf()),
    Some(path) => {
      // Bare names like "mpv.com" are looked up on PATH.
      which::which(path).ok()
    }
    None => find_mpv(),
  }
}

/// Everything needed to launch MPV for one file.
#[derive(Debug, Clone)]
pub struct SpawnRequest<'a> {
  pub executable: &'a Path,
  pub media: &'a Path,
  pub ipc_path: &'a str,
  pub start: Option<f64>,
  pub extra_args: &'a [String],
}

/// Build the MPV command line for a request.
pub fn build_args(req: &SpawnRequest<'_>) -> Vec<OsString> {
  let mut args: Vec<OsString> = vec![
    "--no-terminal".into(),
    "--no-input-terminal".into(),
    "--force-window=yes".into(),
    "--keep-open=no".into(),
    format!("--input-ipc-server={}", req.ipc_path).into(),
    "--sub-auto=fuzzy".into(),
    "--audio-file-auto=fuzzy".into(),
  ];

  if let Some(start) = req.start.filter(|s| s.is_finite() && *s > 0.0) {
    args.push(format!("--start={}", start).into());
  }

  args.extend(req.extra_args.iter().map(OsString::from));

  // Everything after `--` is a file, even names starting with a dash.
  args.push("--".into());
  args.push(req.media.as_os_str().to_owned());
  args
}

/// A running MPV process.
///
/// The child is owned by a watcher task: it reports an unexpected exit
/// through the receiver returned by [`MpvProcess::spawn`], or kills the
/// child when [`MpvProcess::terminate`] is called.
pub struct MpvProcess {
  ipc_path: String,
  cancel: CancellationToken,
  watcher: Option<JoinHandle<()>>,
}

impl MpvProcess {
  /// Spawn MPV with IPC server enabled, working in the media's directory.
  pub fn spawn(req: &SpawnRequest<'_>) -> Result<(Self, oneshot::Receiver<ExitStatus>)> {
    let args = build_args(req);
    let working_dir = req
      .media
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .map(Path::to_path_buf);

    log::info!(
      "Spawning MPV: {:?} with IPC: {}",
      req.executable,
      req.ipc_path
    );
    if !req.extra_args.is_empty() {
      log::info!("Extra MPV args: {:?}", req.extra_args);
    }

    let mut cmd = Command::new(req.executable);
    cmd
      .args(&args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &working_dir {
      cmd.current_dir(dir);
    }

    let mut child = cmd
      .spawn()
      .map_err(|e| PlayerError::BackendStartFailed(format!("{}: {}", req.executable.display(), e)))?;
    log::info!("MPV started (pid: {:?})", child.id());

    if let Some(stdout) = child.stdout.take() {
      forward_output(stdout, "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
      forward_output(stderr, "stderr");
    }

    let cancel = CancellationToken::new();
    let (exit_tx, exit_rx) = oneshot::channel();
    let watcher = tokio::spawn(watch(child, cancel.clone(), exit_tx));

    Ok((
      Self {
        ipc_path: req.ipc_path.to_string(),
        cancel,
        watcher: Some(watcher),
      },
      exit_rx,
    ))
  }

  /// Kill the process if alive, wait for it, and remove its socket.
  pub async fn terminate(mut self) {
    self.cancel.cancel();
    if let Some(watcher) = self.watcher.take() {
      if let Err(e) = watcher.await {
        log::error!("MPV watcher task failed: {}", e);
      }
    }
  }
}

impl Drop for MpvProcess {
  fn drop(&mut self) {
    self.cancel.cancel();
    cleanup_ipc(&self.ipc_path);
  }
}

async fn watch(mut child: Child, cancel: CancellationToken, exit_tx: oneshot::Sender<ExitStatus>) {
  tokio::select! {
    _ = cancel.cancelled() => {
      log::info!("Killing MPV process (pid: {:?})", child.id());
      match child.kill().await {
        Ok(()) => log::debug!("MPV process killed"),
        Err(e) => log::warn!("kill() failed: {}", e),
      }
    }
    status = child.wait() => {
      match status {
        Ok(status) => {
          log::info!("MPV process exited with: {}", status);
          let _ = exit_tx.send(status);
        }
        Err(e) => log::error!("wait() failed: {}", e),
      }
    }
  }
}

fn forward_output<R>(stream: R, label: &'static str)
where
  R: AsyncRead + Send + Unpin + 'static,
{
  tokio::spawn(async move {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
      log::debug!("mpv {}: {}", label, line);
    }
  });
}

/// Remove a leftover socket file. Windows named pipes need no cleanup.
pub fn cleanup_ipc(path: &str) {
  #[cfg(not(windows))]
  {
    match std::fs::remove_file(path) {
      Ok(()) => log::debug!("Removed IPC socket {}", path),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => log::warn!("Failed to remove IPC socket {}: {}", path, e),
    }
  }
  #[cfg(windows)]
  {
    let _ = path;
  }
}
