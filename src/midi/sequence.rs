//! Sequence container.
//!
//! A sequence is a complete loaded piece: tracks, tempo, resolution and the
//! playback pointers (active track, solo track). Track lists and notes are
//! only mutated through methods here so the cached max tick never goes stale.

use super::note::{Note, NoteId};
use super::track::{Track, TrackId};
use super::{tempo_to_bpm, ticks_to_ms, DEFAULT_PPQ, DEFAULT_TEMPO};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a loaded sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(Uuid);

impl SequenceId {
    /// Generates a new random sequence ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SequenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete MIDI sequence with multiple tracks.
#[derive(Debug, Clone)]
pub struct Sequence {
    id: SequenceId,

    /// Ticks per quarter note.
    ppq: u16,

    /// Microseconds per quarter note.
    tempo: u32,

    tracks: Vec<Track>,

    next_track_id: u32,

    active_track: Option<TrackId>,

    solo_track: Option<TrackId>,

    /// Max over timed notes of start + length. Recomputed on every mutation.
    max_tick: u32,
}

impl Sequence {
    /// Creates an empty sequence at 480 PPQ and 120 BPM.
    pub fn new() -> Self {
        Self {
            id: SequenceId::new(),
            ppq: DEFAULT_PPQ,
            tempo: DEFAULT_TEMPO,
            tracks: Vec::new(),
            next_track_id: 0,
            active_track: None,
            solo_track: None,
            max_tick: 0,
        }
    }

    /// Creates an empty sequence with the given resolution and tempo.
    pub fn with_timing(ppq: u16, tempo: u32) -> Self {
        let mut sequence = Self::new();
        sequence.set_ppq(ppq);
        sequence.set_tempo(tempo);
        sequence
    }

    pub fn id(&self) -> SequenceId {
        self.id
    }

    /// Ticks per quarter note.
    pub fn ppq(&self) -> u16 {
        self.ppq
    }

    /// Sets the resolution. Zero is rejected and replaced by the default.
    pub fn set_ppq(&mut self, ppq: u16) {
        self.ppq = if ppq == 0 { DEFAULT_PPQ } else { ppq };
    }

    /// Tempo in microseconds per quarter note.
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Sets the tempo. Zero is rejected and replaced by the default.
    pub fn set_tempo(&mut self, tempo: u32) {
        self.tempo = if tempo == 0 { DEFAULT_TEMPO } else { tempo };
    }

    /// Tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        tempo_to_bpm(self.tempo)
    }

    /// The last tick any timed note is still sounding at.
    pub fn max_tick(&self) -> u32 {
        self.max_tick
    }

    /// Wall-clock position of a tick, in milliseconds.
    pub fn tick_to_ms(&self, tick: u32) -> f64 {
        ticks_to_ms(tick, self.tempo, self.ppq)
    }

    /// Total duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.tick_to_ms(self.max_tick)
    }

    /// Creates and appends an empty track.
    ///
    /// # Returns
    ///
    /// The TrackId of the created track
    pub fn add_track(&mut self, name: impl Into<String>) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.push_track(Track::new(id, name));
        id
    }

    /// Appends a track built elsewhere in the crate, keeping ids unique.
    pub(crate) fn push_track(&mut self, track: Track) {
        self.next_track_id = self.next_track_id.max(track.id.0.saturating_add(1));
        self.tracks.push(track);
        self.recompute_max_tick();
    }

    /// Removes a track by its ID, clearing any pointer that referenced it.
    pub fn remove_track(&mut self, id: TrackId) -> Option<Track> {
        let pos = self.tracks.iter().position(|t| t.id == id)?;
        let track = self.tracks.remove(pos);
        if self.active_track == Some(id) {
            self.active_track = None;
        }
        if self.solo_track == Some(id) {
            self.solo_track = None;
        }
        self.recompute_max_tick();
        Some(track)
    }

    /// Removes every track.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.active_track = None;
        self.solo_track = None;
        self.recompute_max_tick();
    }

    /// Returns a reference to a track by its ID.
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Returns a reference to a track by index.
    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Returns all tracks in order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Returns the number of tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Runs `edit` against a track, then refreshes derived state.
    ///
    /// This is the only way to get mutable access to a track.
    pub fn edit_track<R>(&mut self, id: TrackId, edit: impl FnOnce(&mut Track) -> R) -> Option<R> {
        let track = self.tracks.iter_mut().find(|t| t.id == id)?;
        let result = edit(track);
        self.recompute_max_tick();
        Some(result)
    }

    /// Adds a note to a track.
    pub fn add_note(&mut self, track: TrackId, note: Note) -> Option<NoteId> {
        self.edit_track(track, |t| t.add_note(note))
    }

    /// Removes a note from a track.
    pub fn remove_note(&mut self, track: TrackId, note: NoteId) -> Option<Note> {
        self.edit_track(track, |t| t.remove_note(note)).flatten()
    }

    /// Finds a note by its ID across all tracks.
    pub fn find_note(&self, note_id: NoteId) -> Option<(TrackId, &Note)> {
        self.tracks
            .iter()
            .find_map(|t| t.get_note(note_id).map(|n| (t.id, n)))
    }

    /// The track front ends consider selected.
    pub fn active_track(&self) -> Option<TrackId> {
        self.active_track
    }

    /// Selects a track. Unknown ids clear the selection.
    pub fn set_active_track(&mut self, id: Option<TrackId>) {
        self.active_track = id.filter(|id| self.track(*id).is_some());
    }

    /// The soloed track, if any.
    pub fn solo_track(&self) -> Option<TrackId> {
        self.solo_track
    }

    /// Moves the solo pointer and the per-track solo flags together.
    ///
    /// Callers that need sounding notes silenced go through the mixer.
    pub(crate) fn set_solo_track(&mut self, id: Option<TrackId>) {
        let id = id.filter(|id| self.track(*id).is_some());
        self.solo_track = id;
        for track in &mut self.tracks {
            track.solo = Some(track.id) == id;
        }
    }

    /// Whether scheduled notes of `id` should dispatch right now.
    ///
    /// If a solo track is set only that track plays; otherwise all unmuted
    /// tracks do.
    pub fn is_audible(&self, id: TrackId) -> bool {
        match self.track(id) {
            None => false,
            Some(track) if track.muted => false,
            Some(track) => self.solo_track.is_none_or(|solo| solo == track.id),
        }
    }

    /// Tracks that scheduled playback dispatches.
    pub fn playable_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| self.is_audible(t.id))
    }

    fn recompute_max_tick(&mut self) {
        self.max_tick = self.tracks.iter().map(Track::max_tick).max().unwrap_or(0);
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}
