//! MIDI track representation.
//!
//! A track holds an ordered list of notes plus the playback flags the mixer
//! consults (mute, solo, volume). Tracks only exist inside a [`Sequence`].
//!
//! [`Sequence`]: super::Sequence

use super::note::{Note, NoteId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a track, unique within its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// A single track of a sequence.
///
/// Notes are kept sorted by start tick; untimed notes sort first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Identifier, assigned by the owning sequence.
    pub id: TrackId,

    /// Human-readable name for the track.
    pub name: String,

    /// MIDI program number (0-127), if the track selects an instrument.
    pub program: Option<u8>,

    /// Instrument name from the file's instrument meta event.
    pub instrument_name: Option<String>,

    /// Fixed MIDI channel (0-15). Channel 9 is drums in General MIDI.
    pub channel: Option<u8>,

    /// Whether the track is shown by front ends.
    pub visible: bool,

    /// Whether this track is excluded from scheduled playback.
    pub muted: bool,

    /// Whether this track is the soloed one. Kept in sync with the sequence's
    /// solo pointer by the mixer.
    pub solo: bool,

    /// Velocity multiplier applied on dispatch.
    pub volume: f32,

    notes: Vec<Note>,
}

impl Track {
    /// Creates an empty track with default flags.
    pub(crate) fn new(id: TrackId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            program: None,
            instrument_name: None,
            channel: None,
            visible: true,
            muted: false,
            solo: false,
            volume: 1.0,
            notes: Vec::new(),
        }
    }

    /// Adds a note, keeping notes sorted by start tick.
    ///
    /// Notes with equal start ticks keep insertion order.
    pub fn add_note(&mut self, note: Note) -> NoteId {
        let id = note.id;
        let pos = self
            .notes
            .partition_point(|n| n.start_tick <= note.start_tick);
        self.notes.insert(pos, note);
        id
    }

    /// Removes a note by its ID.
    pub fn remove_note(&mut self, id: NoteId) -> Option<Note> {
        let pos = self.notes.iter().position(|n| n.id == id)?;
        Some(self.notes.remove(pos))
    }

    /// Returns a reference to a note by its ID.
    pub fn get_note(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Returns all notes in the track (sorted by start tick).
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Returns the end tick of the last timed note, or 0.
    pub fn max_tick(&self) -> u32 {
        self.notes
            .iter()
            .filter_map(Note::end_tick)
            .max()
            .unwrap_or(0)
    }

    /// Returns the number of notes in the track.
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    /// Clears all notes from the track.
    pub fn clear(&mut self) {
        self.notes.clear();
    }
}
