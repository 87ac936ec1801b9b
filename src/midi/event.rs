//! Raw Standard MIDI File events and chunk-level codec.
//!
//! This layer is byte-exact: it knows about chunks, variable-length
//! quantities and running status, but not about notes or tracks. The
//! interpretation into a [`Sequence`](super::Sequence) lives in
//! `midi_import` / `midi_export`.

use crate::error::CodecError;

/// Largest value a 4-byte variable-length quantity can hold.
pub const MAX_VLQ_VALUE: u32 = 0x0FFF_FFFF;

/// Meta event type: track name.
pub(crate) const META_TRACK_NAME: u8 = 0x03;
/// Meta event type: instrument name.
pub(crate) const META_INSTRUMENT_NAME: u8 = 0x04;
/// Meta event type: end of track.
pub(crate) const META_END_OF_TRACK: u8 = 0x2F;
/// Meta event type: set tempo (3-byte big-endian microseconds per quarter).
pub(crate) const META_SET_TEMPO: u8 = 0x51;

/// The payload of a single track event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    NoteOff { channel: u8, key: u8, velocity: u8 },
    NoteOn { channel: u8, key: u8, velocity: u8 },
    /// Polyphonic aftertouch.
    KeyPressure { channel: u8, key: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelAftertouch { channel: u8, pressure: u8 },
    /// 14-bit value, 0x2000 is center.
    PitchBend { channel: u8, value: u16 },
    Meta { meta_type: u8, data: Vec<u8> },
    /// `status` is 0xF0 (normal) or 0xF7 (escape/continuation).
    SysEx { status: u8, data: Vec<u8> },
    /// System status byte that has no meaning inside a file, with the data
    /// bytes its status defines (two for 0xF2, one for 0xF1 and 0xF3).
    Unknown { status: u8, data: Vec<u8> },
}

impl EventKind {
    /// MIDI channel for channel-voice events.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            EventKind::NoteOff { channel, .. }
            | EventKind::NoteOn { channel, .. }
            | EventKind::KeyPressure { channel, .. }
            | EventKind::ControlChange { channel, .. }
            | EventKind::ProgramChange { channel, .. }
            | EventKind::ChannelAftertouch { channel, .. }
            | EventKind::PitchBend { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Status byte of a channel-voice event.
    fn channel_status(&self) -> Option<u8> {
        let high = match self {
            EventKind::NoteOff { .. } => 0x80,
            EventKind::NoteOn { .. } => 0x90,
            EventKind::KeyPressure { .. } => 0xA0,
            EventKind::ControlChange { .. } => 0xB0,
            EventKind::ProgramChange { .. } => 0xC0,
            EventKind::ChannelAftertouch { .. } => 0xD0,
            EventKind::PitchBend { .. } => 0xE0,
            _ => return None,
        };
        self.channel().map(|ch| high | (ch & 0x0F))
    }

    /// Program change and channel aftertouch are always written with an
    /// explicit status byte.
    fn forbids_running_status(&self) -> bool {
        matches!(
            self,
            EventKind::ProgramChange { .. } | EventKind::ChannelAftertouch { .. }
        )
    }
}

/// A delta-timed event as it appears in a track chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Ticks since the previous event in the same chunk.
    pub delta: u32,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }
}

/// A whole file at the chunk level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMidiFile {
    /// SMF format: 0, 1 or 2.
    pub format: u16,
    /// Ticks per quarter note.
    pub division: u16,
    pub tracks: Vec<Vec<RawEvent>>,
}

/// Bounds-checked big-endian cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CodecError::malformed("unexpected end of data"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, CodecError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a variable-length quantity of at most 4 bytes.
    fn read_vlq(&mut self) -> Result<u32, CodecError> {
        let mut value = 0u32;
        for _ in 0..4 {
            let byte = self.read_u8()?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::malformed(
            "variable-length quantity longer than 4 bytes",
        ))
    }
}

/// Writes a variable-length quantity (VLQ) used for delta times in MIDI.
///
/// VLQ encodes values using 7 bits per byte, with the MSB indicating
/// whether more bytes follow. Values above [`MAX_VLQ_VALUE`] are clamped.
pub(crate) fn write_vlq(value: u32, buffer: &mut Vec<u8>) {
    let value = value.min(MAX_VLQ_VALUE);
    let mut bytes = [0u8; 4];
    let mut len = 0;
    let mut temp = value;
    loop {
        bytes[len] = (temp & 0x7F) as u8;
        len += 1;
        temp >>= 7;
        if temp == 0 {
            break;
        }
    }
    // Most significant group first, continuation bit on all but the last
    for i in (0..len).rev() {
        let continuation = if i > 0 { 0x80 } else { 0x00 };
        buffer.push(bytes[i] | continuation);
    }
}

/// Decodes a Standard MIDI File into chunk-level events.
///
/// # Errors
///
/// - `MalformedFile` on a bad `MThd`/`MTrk` magic, a header length other
///   than 6, truncated data, an over-long VLQ, or a data byte where a status
///   byte is required and no running status is established
/// - `UnsupportedTiming` for SMPTE divisions
pub fn decode_raw(data: &[u8]) -> Result<RawMidiFile, CodecError> {
    let mut reader = Reader::new(data);

    if reader.read_bytes(4)? != b"MThd" {
        return Err(CodecError::malformed("missing MThd header"));
    }
    let header_len = reader.read_u32()?;
    if header_len != 6 {
        return Err(CodecError::malformed(format!(
            "header length {} (expected 6)",
            header_len
        )));
    }
    let format = reader.read_u16()?;
    if format > 2 {
        return Err(CodecError::malformed(format!("unknown format {}", format)));
    }
    let track_count = reader.read_u16()?;
    let division = reader.read_u16()?;
    if division & 0x8000 != 0 {
        return Err(CodecError::UnsupportedTiming);
    }
    if division == 0 {
        return Err(CodecError::malformed("division of 0 ticks per quarter"));
    }

    let mut tracks = Vec::with_capacity(track_count as usize);
    for index in 0..track_count {
        if reader.read_bytes(4)? != b"MTrk" {
            return Err(CodecError::malformed(format!(
                "track {}: missing MTrk header",
                index
            )));
        }
        let len = reader.read_u32()? as usize;
        let body = reader.read_bytes(len).map_err(|_| {
            CodecError::malformed(format!("track {}: chunk length exceeds file", index))
        })?;
        tracks.push(decode_track(body, index)?);
    }

    Ok(RawMidiFile {
        format,
        division,
        tracks,
    })
}

fn decode_track(body: &[u8], index: u16) -> Result<Vec<RawEvent>, CodecError> {
    let mut reader = Reader::new(body);
    let mut running: Option<u8> = None;
    let mut events = Vec::new();

    while !reader.is_empty() {
        let delta = reader.read_vlq()?;
        let first = reader.read_u8()?;
        let kind = match first {
            0xFF => {
                let meta_type = reader.read_u8()?;
                let len = reader.read_vlq()? as usize;
                let data = reader.read_bytes(len)?.to_vec();
                EventKind::Meta { meta_type, data }
            }
            0xF0 | 0xF7 => {
                let len = reader.read_vlq()? as usize;
                let data = reader.read_bytes(len)?.to_vec();
                EventKind::SysEx {
                    status: first,
                    data,
                }
            }
            0xF1..=0xFE => {
                tracing::debug!(track = index, status = first, "skipping unknown status byte");
                let len = match first {
                    0xF2 => 2,
                    0xF1 | 0xF3 => 1,
                    _ => 0,
                };
                let data = reader.read_bytes(len)?.to_vec();
                EventKind::Unknown {
                    status: first,
                    data,
                }
            }
            0x80..=0xEF => {
                running = Some(first);
                decode_channel_event(first, None, &mut reader)?
            }
            _ => {
                let status = running.ok_or_else(|| {
                    CodecError::malformed(format!(
                        "track {}: data byte {:#04x} with no running status",
                        index, first
                    ))
                })?;
                decode_channel_event(status, Some(first), &mut reader)?
            }
        };

        let end_of_track = matches!(
            kind,
            EventKind::Meta {
                meta_type: META_END_OF_TRACK,
                ..
            }
        );
        events.push(RawEvent { delta, kind });
        if end_of_track {
            break;
        }
    }

    Ok(events)
}

/// Data bytes of one channel-voice message.
///
/// `pending` holds the byte already consumed when running status applied.
struct DataBytes<'r, 'a> {
    reader: &'r mut Reader<'a>,
    pending: Option<u8>,
    status: u8,
}

impl DataBytes<'_, '_> {
    fn next(&mut self) -> Result<u8, CodecError> {
        let byte = match self.pending.take() {
            Some(byte) => byte,
            None => self.reader.read_u8()?,
        };
        if byte & 0x80 != 0 {
            return Err(CodecError::malformed(format!(
                "status byte {:#04x} inside channel message {:#04x}",
                byte, self.status
            )));
        }
        Ok(byte)
    }
}

fn decode_channel_event(
    status: u8,
    first_data: Option<u8>,
    reader: &mut Reader<'_>,
) -> Result<EventKind, CodecError> {
    let channel = status & 0x0F;
    let mut data = DataBytes {
        reader,
        pending: first_data,
        status,
    };

    let kind = match status & 0xF0 {
        0x80 => EventKind::NoteOff {
            channel,
            key: data.next()?,
            velocity: data.next()?,
        },
        0x90 => EventKind::NoteOn {
            channel,
            key: data.next()?,
            velocity: data.next()?,
        },
        0xA0 => EventKind::KeyPressure {
            channel,
            key: data.next()?,
            pressure: data.next()?,
        },
        0xB0 => EventKind::ControlChange {
            channel,
            controller: data.next()?,
            value: data.next()?,
        },
        0xC0 => EventKind::ProgramChange {
            channel,
            program: data.next()?,
        },
        0xD0 => EventKind::ChannelAftertouch {
            channel,
            pressure: data.next()?,
        },
        _ => {
            let lsb = data.next()? as u16;
            let msb = data.next()? as u16;
            EventKind::PitchBend {
                channel,
                value: (msb << 7) | lsb,
            }
        }
    };
    Ok(kind)
}

/// Encodes chunk-level events into a Standard MIDI File.
///
/// The header counts at most 65535 chunks; tracks past that are not written.
pub fn encode_raw(file: &RawMidiFile) -> Vec<u8> {
    let count = u16::try_from(file.tracks.len()).unwrap_or(u16::MAX);
    if usize::from(count) < file.tracks.len() {
        tracing::warn!(
            tracks = file.tracks.len(),
            written = count,
            "too many tracks for one file, truncating"
        );
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&file.format.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&file.division.to_be_bytes());

    for track in file.tracks.iter().take(usize::from(count)) {
        let body = encode_track(track);
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
    }
    out
}

fn encode_track(events: &[RawEvent]) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut running: Option<u8> = None;

    for event in events {
        write_vlq(event.delta, &mut buffer);
        match &event.kind {
            EventKind::Meta { meta_type, data } => {
                buffer.push(0xFF);
                buffer.push(*meta_type);
                write_vlq(data.len() as u32, &mut buffer);
                buffer.extend_from_slice(data);
                running = None;
            }
            EventKind::SysEx { status, data } => {
                buffer.push(*status);
                write_vlq(data.len() as u32, &mut buffer);
                buffer.extend_from_slice(data);
                running = None;
            }
            EventKind::Unknown { status, data } => {
                buffer.push(*status);
                buffer.extend_from_slice(data);
                running = None;
            }
            kind => {
                let Some(status) = kind.channel_status() else {
                    continue;
                };
                if running != Some(status) || kind.forbids_running_status() {
                    buffer.push(status);
                }
                running = Some(status);
                write_channel_data(kind, &mut buffer);
            }
        }
    }

    buffer
}

fn write_channel_data(kind: &EventKind, buffer: &mut Vec<u8>) {
    match *kind {
        EventKind::NoteOff { key, velocity, .. } | EventKind::NoteOn { key, velocity, .. } => {
            buffer.extend_from_slice(&[key & 0x7F, velocity & 0x7F]);
        }
        EventKind::KeyPressure { key, pressure, .. } => {
            buffer.extend_from_slice(&[key & 0x7F, pressure & 0x7F]);
        }
        EventKind::ControlChange {
            controller, value, ..
        } => {
            buffer.extend_from_slice(&[controller & 0x7F, value & 0x7F]);
        }
        EventKind::ProgramChange { program, .. } => buffer.push(program & 0x7F),
        EventKind::ChannelAftertouch { pressure, .. } => buffer.push(pressure & 0x7F),
        EventKind::PitchBend { value, .. } => {
            buffer.extend_from_slice(&[(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]);
        }
        _ => {}
    }
}
