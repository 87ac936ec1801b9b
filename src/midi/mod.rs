//! MIDI data structures and the Standard MIDI File codec.
//!
//! This module provides the sequence model (notes, tracks, sequences) and the
//! binary codec that turns `.mid` bytes into a [`Sequence`] and back.

mod event;
mod midi_export;
mod midi_import;
mod note;
mod sequence;
mod track;

pub use event::{decode_raw, encode_raw, EventKind, RawEvent, RawMidiFile, MAX_VLQ_VALUE};
pub use midi_export::{export_sequence, write_sequence_file};
pub use midi_import::{import_sequence, load_sequence_file};
pub use note::{Note, NoteId};
pub use sequence::{Sequence, SequenceId};
pub use track::{Track, TrackId};

/// Standard MIDI note names for display purposes.
/// Maps MIDI note number (0-127) to note name within an octave.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Default resolution in ticks per quarter note.
pub const DEFAULT_PPQ: u16 = 480;

/// Default tempo in microseconds per quarter note (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Velocity used for notes that carry none.
pub const DEFAULT_VELOCITY: u8 = 100;

/// Converts a MIDI note number to a human-readable note name with octave.
///
/// # Examples
///
/// ```
/// use midimix::midi::note_to_name;
///
/// assert_eq!(note_to_name(60), "C4");
/// ```
pub fn note_to_name(note: u8) -> String {
    let octave = (note / 12) as i8 - 1; // MIDI octave convention
    let note_index = (note % 12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

/// Milliseconds covered by one tick at the given tempo and resolution.
///
/// # Arguments
///
/// * `tempo` - Microseconds per quarter note
/// * `ppq` - Ticks per quarter note
pub fn ms_per_tick(tempo: u32, ppq: u16) -> f64 {
    (tempo as f64 / ppq.max(1) as f64) / 1000.0
}

/// Converts ticks to milliseconds.
pub fn ticks_to_ms(ticks: u32, tempo: u32, ppq: u16) -> f64 {
    ticks as f64 * ms_per_tick(tempo, ppq)
}

/// Converts milliseconds to whole ticks (rounded down).
///
/// Equivalent to `floor(ms / ms_per_tick)`, evaluated without the lossy
/// intermediate division so whole beats land on exact tick values.
pub fn ms_to_ticks(ms: f64, tempo: u32, ppq: u16) -> u32 {
    (ms * 1000.0 * ppq.max(1) as f64 / tempo.max(1) as f64).floor() as u32
}

/// Converts a tempo in microseconds per quarter note to beats per minute.
pub fn tempo_to_bpm(tempo: u32) -> f64 {
    60_000_000.0 / tempo.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_name() {
        assert_eq!(note_to_name(60), "C4");
        assert_eq!(note_to_name(69), "A4");
        assert_eq!(note_to_name(0), "C-1");
        assert_eq!(note_to_name(127), "G9");
    }

    #[test]
    fn test_tick_conversions() {
        // 120 BPM at 480 PPQ: one beat is 500 ms
        assert!((ticks_to_ms(480, DEFAULT_TEMPO, DEFAULT_PPQ) - 500.0).abs() < 1e-9);
        assert_eq!(ms_to_ticks(500.0, DEFAULT_TEMPO, DEFAULT_PPQ), 480);
        assert_eq!(ms_to_ticks(0.9, DEFAULT_TEMPO, DEFAULT_PPQ), 0);
        assert!((tempo_to_bpm(DEFAULT_TEMPO) - 120.0).abs() < 1e-9);
    }
}
