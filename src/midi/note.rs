//! MIDI note representation.
//!
//! A note is the logical unit the router tracks ownership for. Timed notes
//! come from files and editing; untimed notes come from live input.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for generating unique note IDs.
static NOTE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a logical note.
///
/// The router keys its sounding-note registry by this id, so a note-off can
/// find the sound it started even after routing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(u64);

impl NoteId {
    /// Generates a new unique note ID.
    ///
    /// Thread-safe: uses atomic increment internally.
    pub fn new() -> Self {
        Self(NOTE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

/// A single MIDI note.
///
/// Start, length and velocity are optional: a note played from an on-screen
/// keyboard has no position in the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier for this note instance.
    pub id: NoteId,

    /// MIDI note number (0-127). 60 = Middle C (C4).
    pub pitch: u8,

    /// Note velocity (0-127). `None` plays at the engine's default velocity.
    pub velocity: Option<u8>,

    /// Start time in ticks from the beginning of the sequence.
    pub start_tick: Option<u32>,

    /// Duration in ticks.
    pub length_ticks: Option<u32>,
}

impl Note {
    /// Creates a timed note.
    ///
    /// # Arguments
    ///
    /// * `pitch` - MIDI note number (0-127)
    /// * `velocity` - Note velocity (0-127)
    /// * `start_tick` - Start position in ticks
    /// * `length_ticks` - Duration in ticks
    ///
    /// # Examples
    ///
    /// ```
    /// use midimix::midi::Note;
    ///
    /// // Middle C, one quarter note at 480 PPQ
    /// let note = Note::new(60, 100, 0, 480);
    /// assert_eq!(note.end_tick(), Some(480));
    /// ```
    pub fn new(pitch: u8, velocity: u8, start_tick: u32, length_ticks: u32) -> Self {
        Self {
            id: NoteId::new(),
            pitch: pitch.min(127),
            velocity: Some(velocity.min(127)),
            start_tick: Some(start_tick),
            length_ticks: Some(length_ticks),
        }
    }

    /// Creates an untimed note, as produced by live input.
    pub fn live(pitch: u8, velocity: Option<u8>) -> Self {
        Self {
            id: NoteId::new(),
            pitch: pitch.min(127),
            velocity: velocity.map(|v| v.min(127)),
            start_tick: None,
            length_ticks: None,
        }
    }

    /// Returns `(start, end)` when both start and length are known.
    pub fn span(&self) -> Option<(u32, u32)> {
        match (self.start_tick, self.length_ticks) {
            (Some(start), Some(length)) => Some((start, start.saturating_add(length))),
            _ => None,
        }
    }

    /// Returns the end tick of this note (start + length).
    pub fn end_tick(&self) -> Option<u32> {
        self.span().map(|(_, end)| end)
    }

    /// Velocity to play at, falling back to `default` for untimed input.
    pub fn velocity_or(&self, default: u8) -> u8 {
        self.velocity.unwrap_or(default)
    }
}
