//! Real-time playback of the loaded sequence.

mod notify;
mod scheduler;

pub use notify::{ListenerId, Listeners, PlaybackEvent};
pub use scheduler::{PlaybackScheduler, PlaybackState};
