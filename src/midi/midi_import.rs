//! Standard MIDI File (SMF) import.
//!
//! Interprets decoded chunks as a [`Sequence`]:
//!
//! - Format 0: the single multiplexed chunk is split into one track per
//!   channel that carries notes. Name and instrument meta events are shared by
//!   every split track since the file does not group them per channel.
//! - Format 1 and 2: each chunk becomes exactly one track. Tempo is read from
//!   the first chunk only.
//!
//! Other controller, aftertouch, pitch bend and sysex events are not part of
//! the track model and are ignored.

use super::event::{
    decode_raw, EventKind, RawEvent, META_INSTRUMENT_NAME, META_SET_TEMPO, META_TRACK_NAME,
};
use super::{Note, Sequence, Track, TrackId};
use crate::error::CodecError;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Open note-ons keyed by (note, channel), each holding (start tick, velocity).
///
/// A key holds a stack so a note-off closes the most recent pairing.
#[derive(Debug, Default)]
struct NotePairing {
    open: HashMap<(u8, u8), Vec<(u32, u8)>>,
}

impl NotePairing {
    fn note_on(&mut self, key: u8, channel: u8, tick: u32, velocity: u8) {
        self.open
            .entry((key, channel))
            .or_default()
            .push((tick, velocity));
    }

    /// Closes the latest open pairing; unmatched note-offs yield nothing.
    fn note_off(&mut self, key: u8, channel: u8, tick: u32) -> Option<Note> {
        let stack = self.open.get_mut(&(key, channel))?;
        let (start, velocity) = stack.pop()?;
        Some(Note::new(key, velocity, start, tick.saturating_sub(start)))
    }

    /// Closes everything still sounding at `tick`, returning (channel, note).
    fn close_all(self, tick: u32) -> Vec<(u8, Note)> {
        let mut closed: Vec<(u8, Note)> = self
            .open
            .into_iter()
            .flat_map(|((key, channel), stack)| {
                stack.into_iter().map(move |(start, velocity)| {
                    (
                        channel,
                        Note::new(key, velocity, start, tick.saturating_sub(start)),
                    )
                })
            })
            .collect();
        closed.sort_by_key(|(channel, note)| (*channel, note.start_tick, note.pitch));
        closed
    }
}

/// What a note-carrying event means for pairing.
enum NoteEdge {
    On { key: u8, channel: u8, velocity: u8 },
    Off { key: u8, channel: u8 },
}

fn note_edge(kind: &EventKind) -> Option<NoteEdge> {
    match *kind {
        EventKind::NoteOn {
            channel,
            key,
            velocity,
        } if velocity > 0 => Some(NoteEdge::On {
            key,
            channel,
            velocity,
        }),
        EventKind::NoteOn { channel, key, .. } | EventKind::NoteOff { channel, key, .. } => {
            Some(NoteEdge::Off { key, channel })
        }
        _ => None,
    }
}

fn meta_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Parses a set-tempo payload (3-byte big-endian microseconds per quarter).
fn meta_tempo(data: &[u8]) -> Option<u32> {
    match *data {
        [a, b, c] => {
            let tempo = u32::from_be_bytes([0, a, b, c]);
            (tempo > 0).then_some(tempo)
        }
        _ => None,
    }
}

/// Builds a sequence from Standard MIDI File bytes.
///
/// # Errors
///
/// Returns the decode error; no partially built sequence is ever returned.
pub fn import_sequence(data: &[u8]) -> Result<Sequence, CodecError> {
    let raw = decode_raw(data)?;

    let mut sequence = Sequence::new();
    sequence.set_ppq(raw.division);

    let tempo = if raw.format == 0 {
        if raw.tracks.len() > 1 {
            tracing::warn!(
                chunks = raw.tracks.len(),
                "format 0 file with several chunks, reading the first only"
            );
        }
        let events = raw.tracks.first().map(Vec::as_slice).unwrap_or_default();
        import_multiplexed(events, &mut sequence)
    } else {
        import_parallel(&raw.tracks, &mut sequence)
    };
    if let Some(tempo) = tempo {
        sequence.set_tempo(tempo);
    }

    tracing::debug!(
        format = raw.format,
        tracks = sequence.track_count(),
        ppq = sequence.ppq(),
        tempo = sequence.tempo(),
        "imported sequence"
    );
    Ok(sequence)
}

/// Reads and imports a `.mid` file from disk.
pub fn load_sequence_file<P: AsRef<Path>>(path: P) -> Result<Sequence, CodecError> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    let sequence = import_sequence(&data)?;
    tracing::info!(
        path = %path.display(),
        tracks = sequence.track_count(),
        max_tick = sequence.max_tick(),
        "loaded MIDI file"
    );
    Ok(sequence)
}

/// Format 0: one chunk, split per channel. Returns the first tempo found.
fn import_multiplexed(events: &[RawEvent], sequence: &mut Sequence) -> Option<u32> {
    let mut tempo: Option<u32> = None;
    let mut name: Option<String> = None;
    let mut instrument: Option<String> = None;
    let mut programs: HashMap<u8, u8> = HashMap::new();
    let mut notes: BTreeMap<u8, Vec<Note>> = BTreeMap::new();
    let mut pairing = NotePairing::default();
    let mut tick = 0u32;

    for event in events {
        tick = tick.saturating_add(event.delta);
        match &event.kind {
            EventKind::Meta { meta_type, data } => match *meta_type {
                META_TRACK_NAME if name.is_none() => name = Some(meta_text(data)),
                META_INSTRUMENT_NAME if instrument.is_none() => {
                    instrument = Some(meta_text(data))
                }
                META_SET_TEMPO if tempo.is_none() => tempo = meta_tempo(data),
                _ => {}
            },
            EventKind::ProgramChange { channel, program } => {
                programs.entry(*channel).or_insert(*program);
            }
            kind => match note_edge(kind) {
                Some(NoteEdge::On {
                    key,
                    channel,
                    velocity,
                }) => {
                    notes.entry(channel).or_default();
                    pairing.note_on(key, channel, tick, velocity);
                }
                Some(NoteEdge::Off { key, channel }) => {
                    if let Some(note) = pairing.note_off(key, channel, tick) {
                        notes.entry(channel).or_default().push(note);
                    }
                }
                None => {}
            },
        }
    }

    for (channel, note) in pairing.close_all(tick) {
        notes.entry(channel).or_default().push(note);
    }

    for (index, (channel, channel_notes)) in notes.into_iter().enumerate() {
        let default_name = format!("Channel {}", channel + 1);
        let mut track = Track::new(
            TrackId(index as u32),
            name.clone().unwrap_or(default_name),
        );
        track.channel = Some(channel);
        track.program = programs.get(&channel).copied();
        track.instrument_name = instrument.clone();
        for note in channel_notes {
            track.add_note(note);
        }
        sequence.push_track(track);
    }

    tempo
}

/// Format 1/2: one track per chunk. Returns the first chunk's tempo.
fn import_parallel(chunks: &[Vec<RawEvent>], sequence: &mut Sequence) -> Option<u32> {
    let mut tempo: Option<u32> = None;

    for (index, events) in chunks.iter().enumerate() {
        let mut track = Track::new(TrackId(index as u32), format!("Track {}", index + 1));
        let mut name: Option<String> = None;
        let mut pairing = NotePairing::default();
        let mut tick = 0u32;

        for event in events {
            tick = tick.saturating_add(event.delta);
            match &event.kind {
                EventKind::Meta { meta_type, data } => match *meta_type {
                    META_TRACK_NAME if name.is_none() => name = Some(meta_text(data)),
                    META_INSTRUMENT_NAME if track.instrument_name.is_none() => {
                        track.instrument_name = Some(meta_text(data))
                    }
                    META_SET_TEMPO if index == 0 && tempo.is_none() => tempo = meta_tempo(data),
                    _ => {}
                },
                EventKind::ProgramChange { channel, program } => {
                    let track_channel = *track.channel.get_or_insert(*channel);
                    if track_channel == *channel && track.program.is_none() {
                        track.program = Some(*program);
                    }
                }
                kind => match note_edge(kind) {
                    Some(NoteEdge::On {
                        key,
                        channel,
                        velocity,
                    }) => {
                        track.channel.get_or_insert(channel);
                        pairing.note_on(key, channel, tick, velocity);
                    }
                    Some(NoteEdge::Off { key, channel }) => {
                        if let Some(note) = pairing.note_off(key, channel, tick) {
                            track.add_note(note);
                        }
                    }
                    None => {}
                },
            }
        }

        for (_, note) in pairing.close_all(tick) {
            track.add_note(note);
        }
        if let Some(name) = name {
            track.name = name;
        }
        sequence.push_track(track);
    }

    tempo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::{encode_raw, RawMidiFile};

    fn on(delta: u32, channel: u8, key: u8, velocity: u8) -> RawEvent {
        RawEvent::new(
            delta,
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            },
        )
    }

    fn off(delta: u32, channel: u8, key: u8) -> RawEvent {
        RawEvent::new(
            delta,
            EventKind::NoteOff {
                channel,
                key,
                velocity: 0,
            },
        )
    }

    fn meta(delta: u32, meta_type: u8, data: &[u8]) -> RawEvent {
        RawEvent::new(
            delta,
            EventKind::Meta {
                meta_type,
                data: data.to_vec(),
            },
        )
    }

    fn program(delta: u32, channel: u8, program: u8) -> RawEvent {
        RawEvent::new(delta, EventKind::ProgramChange { channel, program })
    }

    fn end() -> RawEvent {
        meta(0, 0x2F, &[])
    }

    fn bytes(format: u16, tracks: Vec<Vec<RawEvent>>) -> Vec<u8> {
        encode_raw(&RawMidiFile {
            format,
            division: 480,
            tracks,
        })
    }

    #[test]
    fn test_format1_two_tracks() {
        let data = bytes(
            1,
            vec![
                vec![
                    meta(0, META_TRACK_NAME, b"Lead"),
                    meta(0, META_SET_TEMPO, &[0x07, 0xA1, 0x20]),
                    on(0, 0, 60, 100),
                    off(480, 0, 60),
                    end(),
                ],
                vec![
                    meta(0, META_SET_TEMPO, &[0x0F, 0x42, 0x40]),
                    on(480, 1, 48, 80),
                    off(480, 1, 48),
                    end(),
                ],
            ],
        );

        let sequence = import_sequence(&data).unwrap();
        assert_eq!(sequence.ppq(), 480);
        // Tempo only from the first chunk
        assert_eq!(sequence.tempo(), 500_000);
        assert_eq!(sequence.track_count(), 2);

        let lead = sequence.track_at(0).unwrap();
        assert_eq!(lead.name, "Lead");
        assert_eq!(lead.channel, Some(0));
        let note = &lead.notes()[0];
        assert_eq!((note.pitch, note.start_tick, note.length_ticks), (60, Some(0), Some(480)));
        assert_eq!(sequence.tick_to_ms(note.start_tick.unwrap()), 0.0);
        assert!((sequence.tick_to_ms(note.end_tick().unwrap()) - 500.0).abs() < 1e-9);

        let second = sequence.track_at(1).unwrap();
        assert_eq!(second.name, "Track 2");
        assert_eq!(second.channel, Some(1));
        assert_eq!(sequence.max_tick(), 960);
    }

    #[test]
    fn test_format0_splits_channels() {
        let data = bytes(
            0,
            vec![vec![
                meta(0, META_TRACK_NAME, b"Song"),
                meta(0, META_INSTRUMENT_NAME, b"GM"),
                program(0, 9, 0),
                program(0, 2, 33),
                on(0, 9, 36, 110),
                on(0, 2, 40, 90),
                off(240, 9, 36),
                on(0, 2, 40, 0), // velocity-0 note-off
                end(),
            ]],
        );

        let sequence = import_sequence(&data).unwrap();
        assert_eq!(sequence.track_count(), 2);
        let channels: Vec<_> = sequence.tracks().iter().map(|t| t.channel).collect();
        assert_eq!(channels, vec![Some(2), Some(9)]);
        for track in sequence.tracks() {
            assert_eq!(track.name, "Song");
            assert_eq!(track.instrument_name.as_deref(), Some("GM"));
            assert_eq!(track.note_count(), 1);
            assert_eq!(track.notes()[0].length_ticks, Some(240));
        }
        assert_eq!(sequence.track_at(0).unwrap().program, Some(33));
    }

    #[test]
    fn test_format0_default_names() {
        let data = bytes(0, vec![vec![on(0, 4, 60, 100), off(10, 4, 60), end()]]);
        let sequence = import_sequence(&data).unwrap();
        assert_eq!(sequence.track_at(0).unwrap().name, "Channel 5");
    }

    #[test]
    fn test_format2_one_track_per_chunk() {
        // Independent patterns; only the first chunk's tempo counts
        let data = bytes(
            2,
            vec![
                vec![
                    meta(0, META_SET_TEMPO, &[0x07, 0xA1, 0x20]),
                    on(0, 3, 50, 70),
                    off(120, 3, 50),
                    end(),
                ],
                vec![
                    meta(0, META_TRACK_NAME, b"Fill"),
                    meta(0, META_SET_TEMPO, &[0x0F, 0x42, 0x40]),
                    program(0, 9, 1),
                    on(0, 9, 38, 100),
                    off(60, 9, 38),
                    end(),
                ],
            ],
        );

        let sequence = import_sequence(&data).unwrap();
        assert_eq!(sequence.track_count(), 2);
        assert_eq!(sequence.tempo(), 500_000);

        let first = sequence.track_at(0).unwrap();
        assert_eq!(first.name, "Track 1");
        assert_eq!(first.channel, Some(3));
        assert_eq!(first.notes()[0].length_ticks, Some(120));

        let fill = sequence.track_at(1).unwrap();
        assert_eq!(fill.name, "Fill");
        assert_eq!((fill.channel, fill.program), (Some(9), Some(1)));
        assert_eq!(fill.notes()[0].start_tick, Some(0));
        assert_eq!(sequence.max_tick(), 120);
    }

    #[test]
    fn test_unmatched_note_off_dropped() {
        let data = bytes(
            1,
            vec![vec![off(0, 0, 60), on(10, 0, 62, 90), off(10, 0, 62), end()]],
        );
        let sequence = import_sequence(&data).unwrap();
        let track = sequence.track_at(0).unwrap();
        assert_eq!(track.note_count(), 1);
        assert_eq!(track.notes()[0].pitch, 62);
    }

    #[test]
    fn test_overlapping_same_key_pairs_latest() {
        let data = bytes(
            1,
            vec![vec![
                on(0, 0, 60, 100),
                on(100, 0, 60, 50),
                off(100, 0, 60), // closes the second note-on
                off(100, 0, 60), // closes the first
                end(),
            ]],
        );
        let sequence = import_sequence(&data).unwrap();
        let notes = sequence.track_at(0).unwrap().notes();
        assert_eq!(notes.len(), 2);
        let shape = |n: &Note| (n.start_tick, n.length_ticks, n.velocity);
        assert_eq!(shape(&notes[0]), (Some(0), Some(300), Some(100)));
        assert_eq!(shape(&notes[1]), (Some(100), Some(100), Some(50)));
    }

    #[test]
    fn test_unclosed_note_ends_with_chunk() {
        let data = bytes(1, vec![vec![on(0, 0, 60, 100), meta(960, 0x2F, &[])]]);
        let sequence = import_sequence(&data).unwrap();
        let note = &sequence.track_at(0).unwrap().notes()[0];
        assert_eq!(note.length_ticks, Some(960));
    }

    #[test]
    fn test_channel_from_program_change() {
        let data = bytes(
            1,
            vec![vec![
                program(0, 5, 24),
                on(0, 5, 60, 100),
                off(10, 5, 60),
                end(),
            ]],
        );
        let sequence = import_sequence(&data).unwrap();
        let track = sequence.track_at(0).unwrap();
        assert_eq!(track.channel, Some(5));
        assert_eq!(track.program, Some(24));
    }

    #[test]
    fn test_empty_chunk_still_becomes_track() {
        let data = bytes(
            1,
            vec![vec![meta(0, META_SET_TEMPO, &[0x09, 0x27, 0xC0]), end()], vec![end()]],
        );
        let sequence = import_sequence(&data).unwrap();
        assert_eq!(sequence.track_count(), 2);
        assert_eq!(sequence.tempo(), 600_000);
        assert_eq!(sequence.track_at(0).unwrap().channel, None);
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        assert!(matches!(
            import_sequence(b"not a midi file"),
            Err(CodecError::MalformedFile(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            load_sequence_file("/definitely/not/here.mid"),
            Err(CodecError::Io(_))
        ));
    }
}
