//! Backend registry and selection with availability-based fallback.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::mock::{self, MockPlayer};
use crate::mpv::{self, MpvPlayer};
use crate::player::MediaPlayer;
use crate::vlc::{self, VlcPlayer};

type AvailabilityFn = Box<dyn Fn(&PlayerConfig) -> bool + Send + Sync>;
type CreateFn = Box<dyn Fn(&PlayerConfig) -> Arc<dyn MediaPlayer> + Send + Sync>;

/// A named backend that can report availability without being instantiated.
pub struct BackendEntry {
  pub name: &'static str,
  available: AvailabilityFn,
  create: CreateFn,
}

impl BackendEntry {
  pub fn new<A, C>(name: &'static str, available: A, create: C) -> Self
  where
    A: Fn(&PlayerConfig) -> bool + Send + Sync + 'static,
    C: Fn(&PlayerConfig) -> Arc<dyn MediaPlayer> + Send + Sync + 'static,
  {
    Self {
      name,
      available: Box::new(available),
      create: Box::new(create),
    }
  }
}

/// Creates players from a fixed, ordered set of backends.
///
/// Registration order is preference order. The only mutable state is the
/// selected backend name, which affects later `create_player` calls only.
pub struct PlayerFactory {
  config: PlayerConfig,
  entries: Vec<BackendEntry>,
  selected: RwLock<Option<String>>,
}

impl PlayerFactory {
  /// Empty registry. `config.backend` becomes the initial selection.
  pub fn new(config: PlayerConfig) -> Self {
    let selected = RwLock::new(config.backend.clone());
    Self {
      config,
      entries: Vec::new(),
      selected,
    }
  }

  /// Registry with `mpv`, `vlc` and `mock`, in that order.
  pub fn with_defaults(config: PlayerConfig) -> Self {
    let mut factory = Self::new(config);
    factory.register(BackendEntry::new(
      mpv::player::BACKEND_NAME,
      MpvPlayer::binary_available,
      |config| Arc::new(MpvPlayer::new(config.clone())) as Arc<dyn MediaPlayer>,
    ));
    factory.register(BackendEntry::new(
      vlc::BACKEND_NAME,
      |_| false,
      |config| Arc::new(VlcPlayer::new(config)) as Arc<dyn MediaPlayer>,
    ));
    factory.register(BackendEntry::new(
      mock::BACKEND_NAME,
      |_| true,
      |_| Arc::new(MockPlayer::new()) as Arc<dyn MediaPlayer>,
    ));
    factory
  }

  /// Add a backend at the end of the preference order.
  /// A later entry with an existing name replaces the earlier one in place.
  pub fn register(&mut self, entry: BackendEntry) {
    match self.entries.iter_mut().find(|e| e.name == entry.name) {
      Some(existing) => *existing = entry,
      None => self.entries.push(entry),
    }
  }

  fn entry(&self, name: &str) -> Option<(usize, &BackendEntry)> {
    self.entries.iter().enumerate().find(|(_, e)| e.name == name)
  }

  /// Instantiate the selected backend, or the next available one after it.
  pub fn create_player(&self) -> Result<Arc<dyn MediaPlayer>> {
    let selected = self.selected.read().clone();
    let start = match &selected {
      Some(name) => match self.entry(name) {
        Some((index, _)) => index,
        None => return Err(PlayerError::UnknownBackend(name.clone())),
      },
      None => 0,
    };

    for entry in &self.entries[start..] {
      if (entry.available)(&self.config) {
        if let Some(wanted) = selected.as_deref().filter(|wanted| *wanted != entry.name) {
          log::warn!(
            "Backend '{}' is not available, falling back to '{}'",
            wanted,
            entry.name
          );
        }
        log::info!("Creating '{}' player", entry.name);
        return Ok((entry.create)(&self.config));
      }
      log::debug!("Backend '{}' is not available", entry.name);
    }

    log::error!("No player backend available");
    Err(PlayerError::NoBackendAvailable)
  }

  /// Select a backend for later `create_player` calls.
  pub fn set_backend(&self, name: &str) -> Result<()> {
    if self.entry(name).is_none() {
      return Err(PlayerError::UnknownBackend(name.to_string()));
    }
    log::info!("Player backend set to '{}'", name);
    *self.selected.write() = Some(name.to_string());
    Ok(())
  }

  /// Explicitly selected backend, if any.
  pub fn current_backend(&self) -> Option<String> {
    self.selected.read().clone()
  }

  pub fn is_backend_available(&self, name: &str) -> bool {
    self
      .entry(name)
      .is_some_and(|(_, entry)| (entry.available)(&self.config))
  }

  /// Names of available backends, in preference order.
  pub fn available_backends(&self) -> Vec<&'static str> {
    self
      .entries
      .iter()
      .filter(|e| (e.available)(&self.config))
      .map(|e| e.name)
      .collect()
  }

  /// Names of all registered backends, in preference order.
  pub fn registered_backends(&self) -> Vec<&'static str> {
    self.entries.iter().map(|e| e.name).collect()
  }
}
