//! SoundFont synthesizer output.
//!
//! [`SynthEngine`] owns the rustysynth synthesizer and the rodio output
//! stream. The stream must stay on the thread that created it, so the mixer
//! receives a [`SynthOutput`] handle that only shares the synthesizer.

use super::OutputTransport;
use crate::error::OutputError;
use anyhow::{Context, Result};
use rodio::{OutputStream, OutputStreamHandle, Source};
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sample rate for audio synthesis (44.1 kHz standard).
pub const SAMPLE_RATE: u32 = 44100;

/// Audio buffer size for low-latency playback.
/// Smaller = lower latency but higher CPU usage.
const BUFFER_SIZE: usize = 256;

/// Audio source that renders samples from the synthesizer.
/// Implements rodio's Source trait for playback.
struct SynthSource {
    synth: Arc<Mutex<Synthesizer>>,
    left_buf: Vec<f32>,
    right_buf: Vec<f32>,
    /// Current position in the buffer.
    buf_pos: usize,
    /// Current channel (0 = left, 1 = right).
    channel: usize,
}

impl SynthSource {
    fn new(synth: Arc<Mutex<Synthesizer>>) -> Self {
        Self {
            synth,
            left_buf: vec![0.0; BUFFER_SIZE],
            right_buf: vec![0.0; BUFFER_SIZE],
            buf_pos: BUFFER_SIZE, // Start at end to trigger first render
            channel: 0,
        }
    }
}

impl Iterator for SynthSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.buf_pos >= BUFFER_SIZE {
            if let Ok(mut synth) = self.synth.lock() {
                synth.render(&mut self.left_buf, &mut self.right_buf);
            } else {
                self.left_buf.fill(0.0);
                self.right_buf.fill(0.0);
            }
            self.buf_pos = 0;
        }

        // Interleave stereo samples: L, R, L, R, ...
        let sample = if self.channel == 0 {
            self.left_buf[self.buf_pos]
        } else {
            self.right_buf[self.buf_pos]
        };

        self.channel = 1 - self.channel;
        if self.channel == 0 {
            self.buf_pos += 1;
        }

        Some(sample)
    }
}

impl Source for SynthSource {
    fn current_frame_len(&self) -> Option<usize> {
        None // Continuous stream
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None // Infinite stream
    }
}

/// A SoundFont synthesizer playing to the default audio device.
pub struct SynthEngine {
    synth: Arc<Mutex<Synthesizer>>,
    /// Audio output stream (must be kept alive).
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    name: String,
}

impl SynthEngine {
    /// Loads a SoundFont and starts streaming the synthesizer to the default
    /// audio output.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The SoundFont file cannot be read or is invalid
    /// - Audio output cannot be initialized
    pub fn new<P: AsRef<Path>>(soundfont_path: P) -> Result<Self> {
        let path = soundfont_path.as_ref();
        let mut file = BufReader::new(
            File::open(path)
                .with_context(|| format!("Failed to open SoundFont: {}", path.display()))?,
        );
        let soundfont = Arc::new(
            SoundFont::new(&mut file)
                .map_err(|e| anyhow::anyhow!("Failed to load SoundFont: {:?}", e))?,
        );

        let settings = SynthesizerSettings::new(SAMPLE_RATE as i32);
        let synth = Synthesizer::new(&soundfont, &settings)
            .map_err(|e| anyhow::anyhow!("Failed to create synthesizer: {:?}", e))?;
        let synth = Arc::new(Mutex::new(synth));

        let (stream, stream_handle) =
            OutputStream::try_default().context("Failed to open audio output")?;
        stream_handle
            .play_raw(SynthSource::new(Arc::clone(&synth)))
            .context("Failed to start audio playback")?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("synth")
            .to_string();
        tracing::info!(soundfont = %path.display(), "synthesizer ready");

        Ok(Self {
            synth,
            _stream: stream,
            _stream_handle: stream_handle,
            name,
        })
    }

    /// Returns a sendable handle for the mixer.
    pub fn output(&self) -> SynthOutput {
        SynthOutput {
            synth: Arc::clone(&self.synth),
            name: self.name.clone(),
        }
    }
}

/// Mixer-side handle to a [`SynthEngine`].
pub struct SynthOutput {
    synth: Arc<Mutex<Synthesizer>>,
    name: String,
}

impl SynthOutput {
    fn with_synth(&self, f: impl FnOnce(&mut Synthesizer)) -> Result<(), OutputError> {
        let mut synth = self
            .synth
            .lock()
            .map_err(|_| OutputError::Device("synthesizer lock poisoned".to_string()))?;
        f(&mut synth);
        Ok(())
    }
}

impl OutputTransport for SynthOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), OutputError> {
        self.with_synth(|s| s.note_on(channel as i32, note as i32, velocity as i32))
    }

    fn note_off(&mut self, channel: u8, note: u8) -> Result<(), OutputError> {
        self.with_synth(|s| s.note_off(channel as i32, note as i32))
    }

    fn program_change(&mut self, channel: u8, program: u8) -> Result<(), OutputError> {
        // Program change is MIDI command 0xC0 (192)
        self.with_synth(|s| s.process_midi_message(channel as i32, 0xC0, program as i32, 0))
    }

    fn control_change(
        &mut self,
        channel: u8,
        controller: u8,
        value: u8,
    ) -> Result<(), OutputError> {
        self.with_synth(|s| {
            s.process_midi_message(channel as i32, 0xB0, controller as i32, value as i32)
        })
    }
}
