//! midimix - A MIDI sequence player and mixer.
//!
//! This library loads Standard MIDI Files into an editable sequence, routes
//! tracks to output devices through a mixer, and plays them in real time.

pub mod config;
pub mod context;
pub mod error;
pub mod midi;
pub mod mixer;
pub mod output;
pub mod playback;

// Re-export commonly used types
pub use config::EngineConfig;
pub use context::{EngineContext, SharedSequence};
pub use error::{CodecError, ConfigError, OutputError, PlaybackError};
pub use midi::{Note, NoteId, Sequence, SequenceId, Track, TrackId};
pub use mixer::{MasterSettings, MixerRouter, OutputTarget, RoutingEntry, StopScope, TrackRef};
pub use output::{OutputId, OutputTransport};
pub use playback::{PlaybackEvent, PlaybackScheduler, PlaybackState};
