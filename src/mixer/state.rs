//! Mixer bookkeeping: sounding notes and per-channel control state.

use super::routing::TrackRef;
use crate::midi::{NoteId, SequenceId};
use crate::output::OutputId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Last controller values sent on one (output, channel).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelControlState {
    pub last_program: Option<u8>,
    pub last_pan_cc: Option<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct ControlCache {
    channels: HashMap<(OutputId, u8), ChannelControlState>,
}

impl ControlCache {
    pub fn get(&self, output: OutputId, channel: u8) -> ChannelControlState {
        self.channels
            .get(&(output, channel))
            .copied()
            .unwrap_or_default()
    }

    pub fn get_mut(&mut self, output: OutputId, channel: u8) -> &mut ChannelControlState {
        self.channels.entry((output, channel)).or_default()
    }

    pub fn purge_output(&mut self, output: OutputId) {
        self.channels.retain(|(id, _), _| *id != output);
    }
}

/// Physical identity of a sounding note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayingKey {
    pub output: OutputId,
    pub channel: u8,
    /// Note number after transposition.
    pub note: u8,
}

/// Which logical note started a sounding key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayingNoteRecord {
    pub note: NoteId,
    pub origin: TrackRef,
}

/// Which sounding notes a stop request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopScope {
    All,
    Sequence(SequenceId),
    Track(TrackRef),
}

impl StopScope {
    pub fn covers(&self, origin: &TrackRef) -> bool {
        match self {
            StopScope::All => true,
            StopScope::Sequence(id) => origin.sequence == *id,
            StopScope::Track(track) => origin == track,
        }
    }
}

/// Registry of sounding notes. One record per key at most.
#[derive(Debug, Default)]
pub(crate) struct PlayingNotes {
    records: HashMap<PlayingKey, PlayingNoteRecord>,
}

impl PlayingNotes {
    pub fn contains(&self, key: &PlayingKey) -> bool {
        self.records.contains_key(key)
    }

    /// Records a sounding note. Returns false if the key is already sounding.
    pub fn insert(&mut self, key: PlayingKey, record: PlayingNoteRecord) -> bool {
        match self.records.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Removes and returns every key for which `pred` holds, sorted.
    pub fn take_where(
        &mut self,
        mut pred: impl FnMut(&PlayingKey, &PlayingNoteRecord) -> bool,
    ) -> Vec<PlayingKey> {
        let mut taken = Vec::new();
        self.records.retain(|key, record| {
            let take = pred(key, record);
            if take {
                taken.push(*key);
            }
            !take
        });
        taken.sort_unstable();
        taken
    }

    pub fn take_note(&mut self, note: NoteId) -> Vec<PlayingKey> {
        self.take_where(|_, record| record.note == note)
    }

    pub fn take_scope(&mut self, scope: StopScope) -> Vec<PlayingKey> {
        self.take_where(|_, record| scope.covers(&record.origin))
    }

    pub fn take_output(&mut self, output: OutputId) -> Vec<PlayingKey> {
        self.take_where(|key, _| key.output == output)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
