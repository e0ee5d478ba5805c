use std::path::PathBuf;

use anyhow::Context;
use cinecase::{LoadOptions, PlayerConfig, PlayerEvent, PlayerFactory};
use clap::{Parser, Subcommand};
use tokio::signal;

#[derive(Parser, Debug)]
#[command(version, about = "Play local media through an external player backend")]
struct Cli {
  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  /// Config file (default: <config dir>/cinecase/player.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Play a media file until it ends or Ctrl-C is pressed
  Play {
    file: PathBuf,

    /// Start offset in seconds
    #[arg(long)]
    start: Option<f64>,

    /// Backend to use (mpv, vlc, mock)
    #[arg(long)]
    backend: Option<String>,

    /// MPV executable
    #[arg(long)]
    mpv_path: Option<String>,

    /// Extra MPV argument, may be repeated
    #[arg(long = "mpv-arg", allow_hyphen_values = true)]
    mpv_args: Vec<String>,
  },
  /// List registered backends and whether they are available
  Backends,
}

fn init_logging(verbose: u8) {
  let default_level = match verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PlayerConfig> {
  match path {
    Some(path) => PlayerConfig::from_file(path)
      .with_context(|| format!("Failed to load config from {}", path.display())),
    None => PlayerConfig::load().context("Failed to load player config"),
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);
  let mut config = load_config(cli.config.as_ref())?;

  match cli.command {
    Command::Backends => {
      let factory = PlayerFactory::with_defaults(config);
      for name in factory.registered_backends() {
        let state = if factory.is_backend_available(name) {
          "available"
        } else {
          "unavailable"
        };
        println!("{name}\t{state}");
      }
      Ok(())
    }
    Command::Play {
      file,
      start,
      backend,
      mpv_path,
      mpv_args,
    } => {
      if backend.is_some() {
        config.backend = backend;
      }
      if mpv_path.is_some() {
        config.mpv_path = mpv_path;
      }
      config.mpv_args.extend(mpv_args);
      config.validate()?;

      let factory = PlayerFactory::with_defaults(config);
      let player = factory.create_player()?;
      log::info!("Using '{}' backend", player.name());

      let events = player.subscribe();
      let options = LoadOptions { start };
      player
        .load_media(&file, options)
        .await
        .with_context(|| format!("Failed to play {}", file.display()))?;

      let run = async {
        while let Some(event) = events.recv().await {
          match event {
            PlayerEvent::StatusChanged(status) => log::info!(
              "{:?} {:.1}/{:.1}s volume={:.2} muted={}",
              status.state,
              status.position,
              status.duration,
              status.volume,
              status.is_muted
            ),
            PlayerEvent::TracksChanged(tracks) => log::info!(
              "Tracks: {} audio, {} subtitles",
              tracks.audio.len(),
              tracks.subtitles.len()
            ),
            PlayerEvent::Error(message) => log::error!("Player error: {}", message),
            PlayerEvent::Ended => {
              log::info!("Playback ended");
              break;
            }
          }
        }
      };

      tokio::select! {
        () = run => {},
        result = signal::ctrl_c() => {
          result.context("Failed to listen for Ctrl-C")?;
          log::info!("Interruption signal received");
        }
      }

      player.cleanup().await;
      Ok(())
    }
  }
}
