//! The mixer router.
//!
//! All mutable routing state sits behind one mutex. Lock order is router
//! state, then the sequence slot; a sequence lock is never held while taking
//! the router lock.

use super::routing::{
    transform, MasterSettings, OutputTarget, RoutingEntry, RoutingTable, TrackRef,
};
use super::state::{ControlCache, PlayingKey, PlayingNoteRecord, PlayingNotes, StopScope};
use crate::config::EngineConfig;
use crate::context::SharedSequence;
use crate::error::OutputError;
use crate::midi::{Note, Sequence, TrackId};
use crate::output::{OutputId, OutputTransport, CC_PAN};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

struct OutputSlot {
    transport: Box<dyn OutputTransport>,
    usable: bool,
}

/// Track properties read at dispatch time.
struct TrackSnapshot {
    origin: TrackRef,
    program: Option<u8>,
    volume: f32,
}

impl TrackSnapshot {
    fn capture(sequence: &Sequence, track: TrackId, require_audible: bool) -> Option<Self> {
        let found = sequence.track(track)?;
        if require_audible && !sequence.is_audible(track) {
            return None;
        }
        Some(Self {
            origin: TrackRef::new(sequence.id(), track),
            program: found.program,
            volume: found.volume,
        })
    }
}

#[derive(Default)]
struct RouterState {
    outputs: BTreeMap<OutputId, OutputSlot>,
    next_output: u32,
    routes: RoutingTable,
    controls: ControlCache,
    playing: PlayingNotes,
    master: MasterSettings,
}

impl RouterState {
    /// Runs `op` against a usable output. On error the output is marked
    /// unusable and everything recorded against it is dropped.
    fn send(
        &mut self,
        output: OutputId,
        op: impl FnOnce(&mut dyn OutputTransport) -> Result<(), OutputError>,
    ) -> bool {
        let Some(slot) = self.outputs.get_mut(&output) else {
            return false;
        };
        if !slot.usable {
            return false;
        }
        let Err(err) = op(slot.transport.as_mut()) else {
            return true;
        };

        warn!(
            output = %output,
            device = slot.transport.name(),
            error = %err,
            "output failed, marking unusable"
        );
        slot.usable = false;
        let lost = self.playing.take_output(output);
        self.controls.purge_output(output);
        if !lost.is_empty() {
            debug!(output = %output, lost = lost.len(), "dropped records of failed output");
        }
        false
    }

    fn targets(&self, target: OutputTarget) -> Vec<OutputId> {
        match target {
            OutputTarget::Output(id) => self
                .outputs
                .get(&id)
                .filter(|slot| slot.usable)
                .map(|_| vec![id])
                .unwrap_or_default(),
            OutputTarget::AllOutputs => self
                .outputs
                .iter()
                .filter(|(_, slot)| slot.usable)
                .map(|(id, _)| *id)
                .collect(),
        }
    }

    /// Sends program and pan only where they differ from the cache.
    fn sync_controls(
        &mut self,
        output: OutputId,
        channel: u8,
        program: Option<u8>,
        pan_cc: u8,
    ) -> bool {
        let cached = self.controls.get(output, channel);

        if let Some(program) = program.filter(|p| cached.last_program != Some(*p)) {
            if !self.send(output, |t| t.program_change(channel, program)) {
                return false;
            }
            self.controls.get_mut(output, channel).last_program = Some(program);
        }

        if cached.last_pan_cc != Some(pan_cc) {
            if !self.send(output, |t| t.control_change(channel, CC_PAN, pan_cc)) {
                return false;
            }
            self.controls.get_mut(output, channel).last_pan_cc = Some(pan_cc);
        }
        true
    }

    fn dispatch(&mut self, note: &Note, track: &TrackSnapshot, velocity: u8) -> usize {
        let entries = self.routes.entries(&track.origin).to_vec();
        let mut started = 0;

        for entry in &entries {
            let dispatched = transform(note.pitch, velocity, track.volume, entry, &self.master);
            let Some(out) = dispatched else {
                debug!(
                    track = %track.origin.track,
                    pitch = note.pitch,
                    "note dropped by transform"
                );
                continue;
            };

            for output in self.targets(entry.target) {
                let key = PlayingKey {
                    output,
                    channel: entry.channel,
                    note: out.note,
                };
                if self.playing.contains(&key) {
                    continue;
                }
                if !self.sync_controls(output, entry.channel, track.program, out.pan_cc) {
                    continue;
                }
                if self.send(output, |t| t.note_on(entry.channel, out.note, out.velocity)) {
                    self.playing.insert(
                        key,
                        PlayingNoteRecord {
                            note: note.id,
                            origin: track.origin,
                        },
                    );
                    started += 1;
                }
            }
        }
        started
    }

    /// Sends note-off for keys already removed from the registry.
    fn silence(&mut self, keys: Vec<PlayingKey>) -> usize {
        let count = keys.len();
        for key in keys {
            self.send(key.output, |t| t.note_off(key.channel, key.note));
        }
        count
    }
}

/// Routes notes from tracks to outputs.
///
/// Safe to call from the scheduler thread and any number of input threads.
pub struct MixerRouter {
    state: Mutex<RouterState>,
    sequence: SharedSequence,
    default_velocity: u8,
}

impl MixerRouter {
    pub fn new(sequence: SharedSequence, config: &EngineConfig) -> Self {
        let state = RouterState {
            master: config.master,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            sequence,
            default_velocity: config.default_velocity.min(127),
        }
    }

    /// Must be called with the router lock held.
    fn snapshot(&self, track: TrackId, require_audible: bool) -> Option<TrackSnapshot> {
        let guard = self.sequence.read();
        TrackSnapshot::capture(guard.as_ref()?, track, require_audible)
    }

    // ----- outputs -----

    pub fn open_output(&self, transport: impl OutputTransport + 'static) -> OutputId {
        let mut state = self.state.lock();
        let id = OutputId(state.next_output);
        state.next_output += 1;
        info!(output = %id, device = transport.name(), "output opened");
        state.outputs.insert(
            id,
            OutputSlot {
                transport: Box::new(transport),
                usable: true,
            },
        );
        id
    }

    /// Silences everything sounding on an output, then removes it.
    pub fn close_output(&self, id: OutputId) -> bool {
        let mut state = self.state.lock();
        let keys = state.playing.take_output(id);
        state.silence(keys);
        state.controls.purge_output(id);
        state.outputs.remove(&id).is_some()
    }

    pub fn is_output_usable(&self, id: OutputId) -> bool {
        self.state.lock().outputs.get(&id).is_some_and(|slot| slot.usable)
    }

    pub fn output_ids(&self) -> Vec<OutputId> {
        self.state.lock().outputs.keys().copied().collect()
    }

    // ----- routing -----

    pub fn add_route(&self, entry: RoutingEntry) {
        self.state.lock().routes.add(entry);
    }

    pub fn set_routes(&self, track: TrackRef, entries: Vec<RoutingEntry>) {
        self.state.lock().routes.set(track, entries);
    }

    pub fn clear_routes(&self, track: &TrackRef) -> usize {
        self.state.lock().routes.clear(track)
    }

    pub fn routes(&self, track: &TrackRef) -> Vec<RoutingEntry> {
        self.state.lock().routes.entries(track).to_vec()
    }

    pub fn route_count(&self) -> usize {
        self.state.lock().routes.len()
    }

    /// Drops entries that no longer name a track of the current sequence.
    pub fn prune_routes(&self) -> usize {
        let mut state = self.state.lock();
        let guard = self.sequence.read();
        let removed = match guard.as_ref() {
            Some(sequence) => state
                .routes
                .retain(|r| r.sequence == sequence.id() && sequence.track(r.track).is_some()),
            None => state.routes.retain(|_| false),
        };
        if removed > 0 {
            debug!(removed, "pruned stale routes");
        }
        removed
    }

    /// Routes every track of the current sequence to `target` on its own
    /// channel. Tracks without a channel get one by position.
    pub fn route_all_tracks(&self, target: OutputTarget) -> usize {
        let mut state = self.state.lock();
        let guard = self.sequence.read();
        let Some(sequence) = guard.as_ref() else {
            return 0;
        };
        for (index, track) in sequence.tracks().iter().enumerate() {
            let channel = track.channel.unwrap_or((index % 16) as u8);
            state.routes.add(RoutingEntry::new(
                TrackRef::new(sequence.id(), track.id),
                target,
                channel,
            ));
        }
        sequence.track_count()
    }

    pub fn master(&self) -> MasterSettings {
        self.state.lock().master
    }

    /// Applies to notes started afterwards. Sounding notes stop under the key
    /// they started with.
    pub fn set_master(&self, master: MasterSettings) {
        self.state.lock().master = master;
    }

    // ----- notes -----

    /// Starts a note on behalf of `track`, ignoring mute and solo.
    ///
    /// Returns the number of outputs that received a note-on.
    pub fn play_note(&self, note: &Note, track: TrackId) -> usize {
        self.start(note, track, false)
    }

    /// Starts a note for scheduled playback. Muted and non-solo tracks are
    /// skipped.
    pub fn play_scheduled(&self, note: &Note, track: TrackId) -> usize {
        self.start(note, track, true)
    }

    fn start(&self, note: &Note, track: TrackId, require_audible: bool) -> usize {
        let mut state = self.state.lock();
        let Some(snapshot) = self.snapshot(track, require_audible) else {
            debug!(track = %track, require_audible, "track not playable");
            return 0;
        };
        let velocity = note.velocity_or(self.default_velocity);
        state.dispatch(note, &snapshot, velocity)
    }

    /// Stops every sounding instance started by `note`.
    pub fn stop_note(&self, note: &Note) -> usize {
        let mut state = self.state.lock();
        let keys = state.playing.take_note(note.id);
        state.silence(keys)
    }

    pub fn stop_all(&self, scope: StopScope) -> usize {
        let mut state = self.state.lock();
        let keys = state.playing.take_scope(scope);
        let stopped = state.silence(keys);
        if stopped > 0 {
            debug!(?scope, stopped, "stopped notes");
        }
        stopped
    }

    /// Sets a track's mute flag and silences whatever the track has sounding.
    pub fn mute_track(&self, track: TrackId, muted: bool) -> bool {
        let origin = {
            let mut guard = self.sequence.write();
            let Some(sequence) = guard.as_mut() else {
                return false;
            };
            if sequence.edit_track(track, |t| t.muted = muted).is_none() {
                return false;
            }
            TrackRef::new(sequence.id(), track)
        };
        self.stop_all(StopScope::Track(origin));
        true
    }

    /// Enabling solo clears it everywhere else and silences the other tracks.
    /// Disabling it on the soloed track clears the sequence's solo pointer.
    pub fn solo_track(&self, track: TrackId, solo: bool) -> bool {
        let sequence_id = {
            let mut guard = self.sequence.write();
            let Some(sequence) = guard.as_mut() else {
                return false;
            };
            if sequence.track(track).is_none() {
                return false;
            }
            if solo {
                sequence.set_solo_track(Some(track));
            } else if sequence.solo_track() == Some(track) {
                sequence.set_solo_track(None);
            } else {
                sequence.edit_track(track, |t| t.solo = false);
            }
            sequence.id()
        };

        if solo {
            let mut state = self.state.lock();
            let keys = state.playing.take_where(|_, record| {
                record.origin.sequence == sequence_id && record.origin.track != track
            });
            state.silence(keys);
        }
        true
    }

    pub fn playing_count(&self) -> usize {
        self.state.lock().playing.len()
    }
}
