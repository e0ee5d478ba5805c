//! Notification fan-out for player instances.
//!
//! Each subscriber gets its own unbounded queue, so a slow or dropped
//! consumer never affects the others. Dropping a [`Subscription`]
//! unregisters it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::{MediaTracks, PlayerStatus};

/// Notifications emitted by a player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
  /// Full status snapshot after any change.
  StatusChanged(PlayerStatus),
  /// Track list changed.
  TracksChanged(MediaTracks),
  /// Playback reached its end.
  Ended,
  /// Degraded state (failed command, player error).
  Error(String),
}

struct HubInner {
  next_id: AtomicU64,
  subscribers: Mutex<Vec<(u64, Sender<PlayerEvent>)>>,
}

/// Per-player notification hub.
#[derive(Clone)]
pub struct EventHub {
  inner: Arc<HubInner>,
}

impl Default for EventHub {
  fn default() -> Self {
    Self::new()
  }
}

impl EventHub {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(HubInner {
        next_id: AtomicU64::new(1),
        subscribers: Mutex::new(Vec::new()),
      }),
    }
  }

  pub fn subscribe(&self) -> Subscription {
    let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = async_channel::unbounded();
    self.inner.subscribers.lock().push((id, tx));
    Subscription {
      id,
      receiver: rx,
      hub: Arc::downgrade(&self.inner),
    }
  }

  /// Deliver to every live subscriber, pruning closed ones.
  pub fn emit(&self, event: PlayerEvent) {
    let mut subscribers = self.inner.subscribers.lock();
    subscribers.retain(|(_, tx)| tx.try_send(event.clone()).is_ok());
  }

  pub fn subscriber_count(&self) -> usize {
    self.inner.subscribers.lock().len()
  }
}

/// A registered listener. Unsubscribes on drop.
pub struct Subscription {
  id: u64,
  receiver: Receiver<PlayerEvent>,
  hub: Weak<HubInner>,
}

impl Subscription {
  /// Wait for the next notification. `None` once the player is gone.
  pub async fn recv(&self) -> Option<PlayerEvent> {
    self.receiver.recv().await.ok()
  }

  /// Next already-queued notification, if any.
  pub fn try_recv(&self) -> Option<PlayerEvent> {
    self.receiver.try_recv().ok()
  }

  /// Drain everything queued so far.
  pub fn drain(&self) -> Vec<PlayerEvent> {
    std::iter::from_fn(|| self.try_recv()).collect()
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(hub) = self.hub.upgrade() {
      hub.subscribers.lock().retain(|(id, _)| *id != self.id);
    }
  }
}
