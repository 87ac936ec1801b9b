//! Shared engine state handed to every component.
//!
//! There is no global instance: callers build one [`EngineContext`] and clone
//! it into whatever needs the sequence, the mixer or the config.

use crate::config::EngineConfig;
use crate::error::CodecError;
use crate::midi::{import_sequence, load_sequence_file, Sequence, SequenceId};
use crate::mixer::{MixerRouter, StopScope};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Slot holding the currently loaded sequence, if any.
pub type SharedSequence = Arc<RwLock<Option<Sequence>>>;

#[derive(Clone)]
pub struct EngineContext {
    sequence: SharedSequence,
    router: Arc<MixerRouter>,
    config: Arc<EngineConfig>,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        let sequence: SharedSequence = Arc::new(RwLock::new(None));
        let router = Arc::new(MixerRouter::new(Arc::clone(&sequence), &config));
        Self {
            sequence,
            router,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<MixerRouter> {
        &self.router
    }

    pub fn sequence(&self) -> &SharedSequence {
        &self.sequence
    }

    pub fn sequence_id(&self) -> Option<SequenceId> {
        self.sequence.read().as_ref().map(Sequence::id)
    }

    /// Reads the loaded sequence. Do not call into the mixer from `f`.
    pub fn with_sequence<R>(&self, f: impl FnOnce(&Sequence) -> R) -> Option<R> {
        self.sequence.read().as_ref().map(f)
    }

    /// Edits the loaded sequence. Do not call into the mixer from `f`.
    pub fn edit_sequence<R>(&self, f: impl FnOnce(&mut Sequence) -> R) -> Option<R> {
        self.sequence.write().as_mut().map(f)
    }

    /// Makes `sequence` current. Notes of the previous sequence are silenced
    /// and routes naming it are dropped.
    pub fn load_sequence(&self, sequence: Sequence) -> SequenceId {
        let id = sequence.id();
        let previous = self.sequence.write().replace(sequence);
        if let Some(previous) = previous {
            self.router.stop_all(StopScope::Sequence(previous.id()));
        }
        self.router.prune_routes();
        id
    }

    /// Removes the current sequence.
    pub fn unload(&self) -> Option<Sequence> {
        let previous = self.sequence.write().take();
        if let Some(previous) = &previous {
            self.router.stop_all(StopScope::Sequence(previous.id()));
        }
        self.router.prune_routes();
        previous
    }

    /// Decodes `bytes` and makes the result current.
    ///
    /// On failure nothing is loaded afterwards.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<SequenceId, CodecError> {
        self.install(import_sequence(bytes))
    }

    /// Reads and decodes a file and makes the result current.
    ///
    /// On failure nothing is loaded afterwards.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<SequenceId, CodecError> {
        self.install(load_sequence_file(path))
    }

    fn install(&self, decoded: Result<Sequence, CodecError>) -> Result<SequenceId, CodecError> {
        match decoded {
            Ok(sequence) => {
                info!(
                    tracks = sequence.track_count(),
                    ppq = sequence.ppq(),
                    bpm = sequence.bpm(),
                    "sequence loaded"
                );
                Ok(self.load_sequence(sequence))
            }
            Err(err) => {
                warn!(error = %err, "sequence load failed");
                self.unload();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{export_sequence, Note};
    use crate::mixer::{OutputTarget, RoutingEntry, TrackRef};
    use crate::output::RecordingOutput;

    fn sample() -> Sequence {
        let mut sequence = Sequence::new();
        let track = sequence.add_track("Lead");
        sequence.add_note(track, Note::new(60, 100, 0, 480));
        sequence
    }

    #[test]
    fn test_load_replaces_and_silences() {
        let ctx = EngineContext::new(EngineConfig::default());
        let rec = RecordingOutput::new("rec");
        let output = ctx.router().open_output(rec.clone());

        let first = ctx.load_sequence(sample());
        let track = ctx.with_sequence(|s| s.tracks()[0].id).unwrap();
        let route = RoutingEntry::new(TrackRef::new(first, track), OutputTarget::Output(output), 0);
        ctx.router().add_route(route);
        ctx.router().play_note(&Note::new(60, 100, 0, 10), track);
        assert_eq!(ctx.router().playing_count(), 1);

        let second = ctx.load_sequence(sample());
        assert_ne!(first, second);
        assert_eq!(ctx.sequence_id(), Some(second));
        assert_eq!(ctx.router().playing_count(), 0);
        assert_eq!(rec.note_off_count(), 1);
        assert_eq!(ctx.router().route_count(), 0);
    }

    #[test]
    fn test_failed_load_clears_slot() {
        let ctx = EngineContext::new(EngineConfig::default());
        let bytes = export_sequence(&sample());
        assert!(ctx.load_bytes(&bytes).is_ok());
        assert!(ctx.sequence_id().is_some());

        assert!(ctx.load_bytes(b"RIFF....").is_err());
        assert!(ctx.sequence_id().is_none());
    }

    #[test]
    fn test_edit_through_context() {
        let ctx = EngineContext::new(EngineConfig::default());
        assert!(ctx.edit_sequence(|s| s.set_tempo(400_000)).is_none());
        ctx.load_sequence(sample());
        ctx.edit_sequence(|s| s.set_tempo(400_000));
        assert_eq!(ctx.with_sequence(Sequence::tempo), Some(400_000));
    }
}
