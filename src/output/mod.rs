//! Output devices the mixer dispatches to.
//!
//! An output is anything that accepts channel-voice messages: the built-in
//! SoundFont synthesizer, a hardware port, or the in-memory recorder used by
//! tests and dry runs.

pub mod recorder;
pub mod synth;

pub use recorder::{OutputCall, RecordingOutput};
pub use synth::{SynthEngine, SynthOutput};

use crate::error::OutputError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an output opened on the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId(pub u32);

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// Controller number for pan.
pub const CC_PAN: u8 = 10;

/// Device abstraction the mixer sends to.
///
/// Calls to one output are delivered in the order issued. A returned error
/// makes the mixer treat the output as unusable.
pub trait OutputTransport: Send {
    /// Human-readable device name for logs.
    fn name(&self) -> &str;

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), OutputError>;

    fn note_off(&mut self, channel: u8, note: u8) -> Result<(), OutputError>;

    fn program_change(&mut self, channel: u8, program: u8) -> Result<(), OutputError>;

    fn control_change(&mut self, channel: u8, controller: u8, value: u8)
        -> Result<(), OutputError>;
}
