//! Standard MIDI File (SMF) export.
//!
//! Writes a [`Sequence`] as SMF Format 1 with one chunk per track, so that
//! importing the result yields the same tracks back.
//!
//! # Limitations
//!
//! - Mute, solo, visibility and volume multiplier are not representable and
//!   are not written
//! - Untimed notes are skipped
//! - A sequence with no tracks writes no chunks, so its tempo is not kept
//! - A track without a fixed channel is written on channel 0 and reads back
//!   with `Some(0)` once it has notes or a program
//! - A note without a velocity is written at the default velocity and reads
//!   back with it set

use super::event::{
    encode_raw, EventKind, RawEvent, RawMidiFile, META_END_OF_TRACK, META_INSTRUMENT_NAME,
    META_SET_TEMPO, META_TRACK_NAME,
};
use super::{Sequence, Track, DEFAULT_VELOCITY};
use crate::error::CodecError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Represents an absolutely timed event for sorting before delta conversion.
struct TimedEvent {
    /// Absolute tick position
    tick: u32,
    /// Priority for sorting events at the same tick (lower = first)
    priority: u8,
    kind: EventKind,
}

impl TimedEvent {
    fn new(tick: u32, priority: u8, kind: EventKind) -> Self {
        Self {
            tick,
            priority,
            kind,
        }
    }
}

// Within a tick: metadata, program, note-offs, note-ons, then the off of a
// zero-length note so it still pairs with its own on.
const PRIORITY_NAME: u8 = 0;
const PRIORITY_INSTRUMENT: u8 = 1;
const PRIORITY_TEMPO: u8 = 2;
const PRIORITY_PROGRAM: u8 = 3;
const PRIORITY_NOTE_OFF: u8 = 10;
const PRIORITY_NOTE_ON: u8 = 11;
const PRIORITY_ZERO_LENGTH_OFF: u8 = 12;
const PRIORITY_END: u8 = 255;

fn meta(meta_type: u8, data: Vec<u8>) -> EventKind {
    EventKind::Meta { meta_type, data }
}

/// Collects and orders one track's events, then converts to delta times.
fn build_track_events(track: &Track, tempo: Option<u32>) -> Vec<RawEvent> {
    let channel = track.channel.unwrap_or(0) & 0x0F;
    let mut events = vec![TimedEvent::new(
        0,
        PRIORITY_NAME,
        meta(META_TRACK_NAME, track.name.as_bytes().to_vec()),
    )];

    if let Some(instrument) = &track.instrument_name {
        events.push(TimedEvent::new(
            0,
            PRIORITY_INSTRUMENT,
            meta(META_INSTRUMENT_NAME, instrument.as_bytes().to_vec()),
        ));
    }

    if let Some(tempo) = tempo {
        // Meta event: FF 51 03 tt tt tt
        let bytes = tempo.min(0x00FF_FFFF).to_be_bytes();
        events.push(TimedEvent::new(
            0,
            PRIORITY_TEMPO,
            meta(META_SET_TEMPO, bytes[1..].to_vec()),
        ));
    }

    if let Some(program) = track.program {
        events.push(TimedEvent::new(
            0,
            PRIORITY_PROGRAM,
            EventKind::ProgramChange { channel, program },
        ));
    }

    for note in track.notes() {
        let Some((start, end)) = note.span() else {
            continue;
        };
        // Velocity 0 would read back as a note-off
        let velocity = note.velocity_or(DEFAULT_VELOCITY).clamp(1, 127);
        events.push(TimedEvent::new(
            start,
            PRIORITY_NOTE_ON,
            EventKind::NoteOn {
                channel,
                key: note.pitch,
                velocity,
            },
        ));
        let off_priority = if end == start {
            PRIORITY_ZERO_LENGTH_OFF
        } else {
            PRIORITY_NOTE_OFF
        };
        events.push(TimedEvent::new(
            end,
            off_priority,
            EventKind::NoteOff {
                channel,
                key: note.pitch,
                velocity: 0,
            },
        ));
    }

    events.push(TimedEvent::new(
        track.max_tick(),
        PRIORITY_END,
        meta(META_END_OF_TRACK, Vec::new()),
    ));

    // Stable sort keeps note order for equal (tick, priority)
    events.sort_by_key(|e| (e.tick, e.priority));

    let mut last_tick = 0u32;
    events
        .into_iter()
        .map(|timed| {
            let delta = timed.tick.saturating_sub(last_tick);
            last_tick = timed.tick;
            RawEvent::new(delta, timed.kind)
        })
        .collect()
}

/// Encodes a sequence as Standard MIDI File bytes.
///
/// The first chunk carries the tempo, matching what the importer reads.
pub fn export_sequence(sequence: &Sequence) -> Vec<u8> {
    let tracks = sequence
        .tracks()
        .iter()
        .enumerate()
        .map(|(index, track)| build_track_events(track, (index == 0).then(|| sequence.tempo())))
        .collect();

    encode_raw(&RawMidiFile {
        format: 1,
        division: sequence.ppq(),
        tracks,
    })
}

/// Exports a sequence to a `.mid` file.
///
/// # Errors
///
/// Returns error if file creation or writing fails
pub fn write_sequence_file<P: AsRef<Path>>(sequence: &Sequence, path: P) -> Result<(), CodecError> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&export_sequence(sequence))?;
    writer.flush()?;
    tracing::info!(
        path = %path.as_ref().display(),
        tracks = sequence.track_count(),
        "wrote MIDI file"
    );
    Ok(())
}
