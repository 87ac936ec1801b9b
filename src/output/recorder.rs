//! In-memory output that records every call.
//!
//! Clones share one log, so a caller can hand one clone to the mixer and
//! inspect the other. Used for dry runs and tests.

use super::{OutputTransport, CC_PAN};
use crate::error::OutputError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One message as the output received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCall {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

#[derive(Debug, Clone)]
pub struct RecordingOutput {
    name: String,
    calls: Arc<Mutex<Vec<OutputCall>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingOutput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Snapshot of every call received so far.
    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn note_on_count(&self) -> usize {
        self.count(|c| matches!(c, OutputCall::NoteOn { .. }))
    }

    pub fn note_off_count(&self) -> usize {
        self.count(|c| matches!(c, OutputCall::NoteOff { .. }))
    }

    /// Number of pan controller messages received.
    pub fn pan_count(&self) -> usize {
        self.count(|c| {
            matches!(
                c,
                OutputCall::ControlChange {
                    controller: CC_PAN,
                    ..
                }
            )
        })
    }

    /// While set, every call fails with `Disconnected` and is not recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn count(&self, pred: impl Fn(&OutputCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: OutputCall) -> Result<(), OutputError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OutputError::Disconnected);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl OutputTransport for RecordingOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), OutputError> {
        self.record(OutputCall::NoteOn {
            channel,
            note,
            velocity,
        })
    }

    fn note_off(&mut self, channel: u8, note: u8) -> Result<(), OutputError> {
        self.record(OutputCall::NoteOff { channel, note })
    }

    fn program_change(&mut self, channel: u8, program: u8) -> Result<(), OutputError> {
        self.record(OutputCall::ProgramChange { channel, program })
    }

    fn control_change(
        &mut self,
        channel: u8,
        controller: u8,
        value: u8,
    ) -> Result<(), OutputError> {
        self.record(OutputCall::ControlChange {
            channel,
            controller,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_log() {
        let output = RecordingOutput::new("rec");
        let mut handle = output.clone();
        handle.note_on(0, 60, 100).unwrap();
        handle.control_change(0, CC_PAN, 64).unwrap();
        handle.note_off(0, 60).unwrap();
        assert_eq!(output.note_on_count(), 1);
        assert_eq!(output.note_off_count(), 1);
        assert_eq!(output.pan_count(), 1);
        assert_eq!(
            output.calls()[0],
            OutputCall::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_failing_output() {
        let output = RecordingOutput::new("rec");
        let mut handle = output.clone();
        output.set_failing(true);
        assert_eq!(handle.note_on(0, 60, 100), Err(OutputError::Disconnected));
        assert!(output.calls().is_empty());
    }
}
