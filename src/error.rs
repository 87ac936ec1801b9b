//! Error types for the engine.

use thiserror::Error;

/// Failures while reading or writing Standard MIDI Files.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed MIDI file: {0}")]
    MalformedFile(String),

    #[error("SMPTE timecode timing not supported")]
    UnsupportedTiming,
}

impl CodecError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        CodecError::MalformedFile(msg.into())
    }
}

/// Reasons `play()` declined to start. Both leave the scheduler untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("playback is already running")]
    AlreadyPlaying,

    #[error("no sequence is loaded")]
    NoActiveSequence,

    #[error("failed to start the playback thread")]
    ThreadSpawn,
}

/// A send to an output device failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("output disconnected")]
    Disconnected,

    #[error("output device error: {0}")]
    Device(String),
}

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
