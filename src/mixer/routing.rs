//! Routing entries and the per-note transform.

use crate::midi::{SequenceId, TrackId};
use crate::output::OutputId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A track within a specific loaded sequence.
///
/// Routes keyed by a stale sequence id never match the current sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackRef {
    pub sequence: SequenceId,
    pub track: TrackId,
}

impl TrackRef {
    pub fn new(sequence: SequenceId, track: TrackId) -> Self {
        Self { sequence, track }
    }
}

/// Where a routing entry sends its notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    Output(OutputId),
    /// Every usable output open on the mixer at dispatch time.
    AllOutputs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingEntry {
    pub track: TrackRef,
    pub target: OutputTarget,
    /// Output channel, 0-15.
    pub channel: u8,
    /// Velocity scale, at least 0.0.
    pub volume: f32,
    /// Semitone transposition.
    pub offset: i32,
    /// -1.0 (left) to 1.0 (right).
    pub pan: f32,
}

impl RoutingEntry {
    pub fn new(track: TrackRef, target: OutputTarget, channel: u8) -> Self {
        Self {
            track,
            target,
            channel: channel.min(15),
            volume: 1.0,
            offset: 0,
            pan: 0.0,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.max(0.0);
        self
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan.clamp(-1.0, 1.0);
        self
    }
}

/// Global transform layered over every routing entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterSettings {
    pub volume: f32,
    pub pan: f32,
    pub offset: i32,
    /// Lowest note that may sound after transposition.
    pub min_note: u8,
    /// Highest note that may sound after transposition.
    pub max_note: u8,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            offset: 0,
            min_note: 0,
            max_note: 127,
        }
    }
}

/// What actually goes out for one (note, entry) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub note: u8,
    pub velocity: u8,
    pub pan_cc: u8,
}

/// Maps pan in [-1, 1] to controller value: -1 gives 0, 0 gives 64, 1 gives 127.
pub fn pan_to_cc(pan: f32) -> u8 {
    ((pan.clamp(-1.0, 1.0) + 1.0) * 63.5).round() as u8
}

/// Applies an entry and the master settings to a note.
///
/// Returns `None` when the transposed note falls outside the master range
/// (or outside 0-127), or when the scaled velocity rounds to zero.
pub fn transform(
    pitch: u8,
    velocity: u8,
    track_volume: f32,
    entry: &RoutingEntry,
    master: &MasterSettings,
) -> Option<Dispatch> {
    let note = i32::from(pitch)
        .saturating_add(entry.offset)
        .saturating_add(master.offset);
    let low = i32::from(master.min_note);
    let high = i32::from(master.max_note.min(127));
    if note < low || note > high {
        return None;
    }

    let scaled = f32::from(velocity) * track_volume * entry.volume * master.volume;
    let velocity = scaled.round().clamp(0.0, 127.0) as u8;
    if velocity == 0 {
        return None;
    }
    let pan_cc = pan_to_cc((entry.pan + master.pan).clamp(-1.0, 1.0));

    Some(Dispatch {
        note: note as u8,
        velocity,
        pan_cc,
    })
}

/// Routing entries grouped by track.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: HashMap<TrackRef, Vec<RoutingEntry>>,
}

impl RoutingTable {
    pub fn add(&mut self, entry: RoutingEntry) {
        self.routes.entry(entry.track).or_default().push(entry);
    }

    /// Replaces the entries of `track`. Entries whose own track differs are
    /// re-keyed to `track`.
    pub fn set(&mut self, track: TrackRef, entries: Vec<RoutingEntry>) {
        let entries: Vec<_> = entries
            .into_iter()
            .map(|mut entry| {
                entry.track = track;
                entry
            })
            .collect();
        if entries.is_empty() {
            self.routes.remove(&track);
        } else {
            self.routes.insert(track, entries);
        }
    }

    pub fn clear(&mut self, track: &TrackRef) -> usize {
        self.routes.remove(track).map_or(0, |entries| entries.len())
    }

    pub fn entries(&self, track: &TrackRef) -> &[RoutingEntry] {
        self.routes.get(track).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drops every track for which `keep` returns false. Returns the number of
    /// entries removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&TrackRef) -> bool) -> usize {
        let mut removed = 0;
        self.routes.retain(|track, entries| {
            let kept = keep(track);
            if !kept {
                removed += entries.len();
            }
            kept
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RoutingEntry {
        RoutingEntry::new(
            TrackRef::new(SequenceId::new(), TrackId(0)),
            OutputTarget::Output(OutputId(0)),
            0,
        )
    }

    #[test]
    fn test_pan_mapping() {
        assert_eq!(pan_to_cc(-1.0), 0);
        assert_eq!(pan_to_cc(0.0), 64);
        assert_eq!(pan_to_cc(1.0), 127);
        assert_eq!(pan_to_cc(-0.5), 32);
        assert_eq!(pan_to_cc(4.0), 127);
    }

    #[test]
    fn test_transpose_and_range() {
        let master = MasterSettings {
            max_note: 80,
            ..Default::default()
        };
        let up = entry().with_offset(12);

        let sent = transform(60, 100, 1.0, &up, &master).unwrap();
        assert_eq!(sent.note, 72);
        assert_eq!(sent.velocity, 100);
        assert_eq!(sent.pan_cc, 64);

        let full = MasterSettings::default();
        assert!(transform(70, 100, 1.0, &up, &master).is_none());
        assert!(transform(60, 100, 1.0, &entry().with_offset(80), &full).is_none());
        assert!(transform(5, 100, 1.0, &entry().with_offset(-12), &full).is_none());
    }

    #[test]
    fn test_extreme_offsets_rejected() {
        let high = MasterSettings {
            offset: i32::MAX,
            ..Default::default()
        };
        assert!(transform(127, 100, 1.0, &entry().with_offset(i32::MAX), &high).is_none());

        let low = MasterSettings {
            offset: i32::MIN,
            ..Default::default()
        };
        assert!(transform(0, 100, 1.0, &entry().with_offset(i32::MIN), &low).is_none());

        // Opposite extremes cancel without overflowing
        let sent = transform(60, 100, 1.0, &entry().with_offset(i32::MIN), &high).unwrap();
        assert_eq!(sent.note, 59);
    }

    #[test]
    fn test_velocity_scaling() {
        let master = MasterSettings {
            volume: 0.5,
            ..Default::default()
        };
        let full = MasterSettings::default();
        let velocity = |v: u8, track: f32| transform(60, v, track, &entry(), &full);
        let half = entry().with_volume(0.5);
        assert_eq!(transform(60, 100, 1.0, &half, &master).unwrap().velocity, 25);
        assert_eq!(velocity(100, 0.8).unwrap().velocity, 80);
        assert_eq!(velocity(127, 1.0).unwrap().velocity, 127);
        assert!(transform(60, 100, 1.0, &entry().with_volume(0.0), &full).is_none());
        assert!(velocity(0, 1.0).is_none());
    }

    #[test]
    fn test_pan_sum_clamped() {
        let master = MasterSettings {
            pan: 0.8,
            ..Default::default()
        };
        let right = entry().with_pan(0.6);
        assert_eq!(transform(60, 100, 1.0, &right, &master).unwrap().pan_cc, 127);
    }

    #[test]
    fn test_table_set_and_retain() {
        let mut table = RoutingTable::default();
        let a = TrackRef::new(SequenceId::new(), TrackId(0));
        let b = TrackRef::new(SequenceId::new(), TrackId(1));

        table.add(RoutingEntry::new(a, OutputTarget::AllOutputs, 0));
        table.set(b, vec![entry(), entry().with_offset(7)]);
        assert_eq!(table.len(), 3);
        assert!(table.entries(&b).iter().all(|e| e.track == b));

        assert_eq!(table.retain(|track| *track == a), 2);
        assert_eq!(table.len(), 1);
        assert!(table.entries(&b).is_empty());
        assert_eq!(table.clear(&a), 1);
        assert!(table.is_empty());
    }
}
