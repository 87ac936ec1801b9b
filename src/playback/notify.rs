//! Playback notifications.
//!
//! Listeners are plain callbacks, invoked on the scheduler thread. A listener
//! that wants events on another thread subscribes through a bounded channel
//! instead; when the channel is full new events are dropped.

use crossbeam_channel::{bounded, Receiver, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The scheduler thread started at `tick`.
    Started { tick: u32 },
    /// Playback advanced to `tick`.
    Position { tick: u32 },
    /// The end of the sequence was reached.
    Finished { tick: u32 },
    /// Playback ended without reaching the end.
    Stopped { tick: u32 },
}

impl PlaybackEvent {
    pub fn tick(&self) -> u32 {
        match *self {
            PlaybackEvent::Started { tick }
            | PlaybackEvent::Position { tick }
            | PlaybackEvent::Finished { tick }
            | PlaybackEvent::Stopped { tick } => tick,
        }
    }

    /// Whether this is the last event of a playback run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackEvent::Finished { .. } | PlaybackEvent::Stopped { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&PlaybackEvent) + Send + Sync>;

#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(ListenerId, Callback)>>,
}

impl Listeners {
    pub fn register(
        &self,
        callback: impl Fn(&PlaybackEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Registers a listener that forwards into a bounded channel.
    pub fn subscribe(&self, capacity: usize) -> (ListenerId, Receiver<PlaybackEvent>) {
        let (sender, receiver) = bounded(capacity.max(1));
        let id = self.register(move |event| match sender.try_send(*event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!(?event, "playback subscriber full, event dropped");
            }
        });
        (id, receiver)
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every listener. The registry lock is not held during calls, so
    /// listeners may register or unregister.
    pub(crate) fn emit(&self, event: PlaybackEvent) {
        let callbacks: Vec<Callback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(&event);
        }
    }
}
