//! Real-time scheduler for the loaded sequence.
//!
//! Playback runs on a dedicated thread. Each step converts wall-clock time
//! since the anchor into a target tick, then fires every note edge in the
//! half-open window `(last_tick, current_tick]`. The first window of a run
//! also includes its start tick.

use super::notify::{ListenerId, Listeners, PlaybackEvent};
use crate::context::EngineContext;
use crate::error::PlaybackError;
use crate::midi::{ms_to_ticks, Note, Sequence, SequenceId, TrackId};
use crate::mixer::StopScope;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    On,
    Off,
}

/// A note edge due inside a window.
#[derive(Debug, Clone)]
pub(crate) struct DueEvent {
    pub tick: u32,
    pub edge: Edge,
    pub track: TrackId,
    pub note: Note,
    rank: u8,
}

/// Collects the note edges whose tick lies in `window`, in dispatch order.
///
/// At equal ticks offs go before ons, so a retriggered key is released
/// first. A zero-length note's off follows its own on. Ons come only from
/// audible tracks; offs come from all of them.
pub(crate) fn due_events(sequence: &Sequence, window: RangeInclusive<u32>) -> Vec<DueEvent> {
    let mut due = Vec::new();
    for track in sequence.tracks() {
        let audible = sequence.is_audible(track.id);
        for note in track.notes() {
            let Some((start, end)) = note.span() else {
                continue;
            };
            if audible && window.contains(&start) {
                due.push(DueEvent {
                    tick: start,
                    edge: Edge::On,
                    track: track.id,
                    note: note.clone(),
                    rank: 1,
                });
            }
            if window.contains(&end) {
                due.push(DueEvent {
                    tick: end,
                    edge: Edge::Off,
                    track: track.id,
                    note: note.clone(),
                    rank: if end == start { 2 } else { 0 },
                });
            }
        }
    }
    due.sort_by_key(|e| (e.tick, e.rank));
    due
}

/// Moves playback toward `target`, at least one tick per step.
///
/// Returns the new tick and whether it reached the end.
pub(crate) fn advance(current: u32, target: u32, max_tick: u32) -> (u32, bool) {
    if current >= max_tick {
        return (current, true);
    }
    let step = target.saturating_sub(current).max(1);
    let next = current.saturating_add(step).min(max_tick);
    (next, next >= max_tick)
}

fn window(start_tick: u32, last: Option<u32>, current: u32) -> RangeInclusive<u32> {
    match last {
        None => start_tick..=current,
        Some(last) => last.saturating_add(1)..=current,
    }
}

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    stop_requested: AtomicBool,
    position: AtomicU32,
    worker: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn on_worker_thread(&self) -> bool {
        *self.worker.lock() == Some(thread::current().id())
    }
}

/// Clears the run flags when the playback thread exits, including by
/// unwinding out of a listener or an output. An unwinding run also silences
/// what its sequence left sounding.
struct RunGuard {
    ctx: EngineContext,
    shared: Arc<Shared>,
    sequence_id: SequenceId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!(sequence = %self.sequence_id, "playback thread unwinding");
            self.ctx
                .router()
                .stop_all(StopScope::Sequence(self.sequence_id));
        }
        self.shared.running.store(false, Ordering::SeqCst);
        *self.shared.worker.lock() = None;
    }
}

enum RunEnd {
    Finished(u32),
    Stopped(u32),
    SequenceGone(u32),
}

/// State owned by the playback thread for one run.
struct Session {
    ctx: EngineContext,
    shared: Arc<Shared>,
    listeners: Arc<Listeners>,
    sequence_id: SequenceId,
    interval: Duration,
    start_tick: u32,
    anchor: Instant,
    anchor_tick: u32,
    tempo: u32,
    ppq: u16,
}

impl Session {
    fn run(mut self) {
        *self.shared.worker.lock() = Some(thread::current().id());
        let _guard = RunGuard {
            ctx: self.ctx.clone(),
            shared: Arc::clone(&self.shared),
            sequence_id: self.sequence_id,
        };
        info!(sequence = %self.sequence_id, tick = self.start_tick, "playback started");
        self.listeners.emit(PlaybackEvent::Started {
            tick: self.start_tick,
        });

        let mut last: Option<u32> = None;
        let mut current = self.start_tick;
        let end = loop {
            if self.shared.stop_requested.load(Ordering::SeqCst) {
                break RunEnd::Stopped(current);
            }
            let Some((next, done)) = self.step(last, current) else {
                break RunEnd::SequenceGone(current);
            };
            current = next;
            last = Some(next);
            self.shared.position.store(next, Ordering::SeqCst);
            self.listeners.emit(PlaybackEvent::Position { tick: next });
            if done {
                break RunEnd::Finished(next);
            }
            thread::sleep(self.interval);
        };

        let event = match end {
            RunEnd::Finished(tick) => {
                // Notes edited away mid-run never get their scheduled off
                self.ctx
                    .router()
                    .stop_all(StopScope::Sequence(self.sequence_id));
                info!(tick, "playback finished");
                self.shared.position.store(0, Ordering::SeqCst);
                PlaybackEvent::Finished { tick }
            }
            RunEnd::Stopped(tick) => {
                self.ctx
                    .router()
                    .stop_all(StopScope::Sequence(self.sequence_id));
                info!(tick, "playback stopped");
                PlaybackEvent::Stopped { tick }
            }
            RunEnd::SequenceGone(tick) => {
                debug!(sequence = %self.sequence_id, "sequence replaced during playback");
                PlaybackEvent::Stopped { tick }
            }
        };
        self.shared.running.store(false, Ordering::SeqCst);
        self.listeners.emit(event);
    }

    /// One scheduler step. `None` when the sequence this run started with is
    /// no longer loaded.
    fn step(&mut self, last: Option<u32>, current: u32) -> Option<(u32, bool)> {
        let (next, done, due) = {
            let guard = self.ctx.sequence().read();
            let sequence = guard.as_ref().filter(|s| s.id() == self.sequence_id)?;

            // Tempo edits take effect from the current tick.
            if sequence.tempo() != self.tempo || sequence.ppq() != self.ppq {
                self.anchor = Instant::now();
                self.anchor_tick = current;
                self.tempo = sequence.tempo();
                self.ppq = sequence.ppq();
            }

            let elapsed_ms = self.anchor.elapsed().as_secs_f64() * 1000.0;
            let target = self
                .anchor_tick
                .saturating_add(ms_to_ticks(elapsed_ms, self.tempo, self.ppq));
            let (next, done) = advance(current, target, sequence.max_tick());
            let due = due_events(sequence, window(self.start_tick, last, next));
            (next, done, due)
        };

        let router = self.ctx.router();
        for event in &due {
            match event.edge {
                Edge::On => {
                    router.play_scheduled(&event.note, event.track);
                }
                Edge::Off => {
                    router.stop_note(&event.note);
                }
            }
        }
        Some((next, done))
    }
}

/// Plays the context's sequence in real time.
pub struct PlaybackScheduler {
    ctx: EngineContext,
    shared: Arc<Shared>,
    listeners: Arc<Listeners>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackScheduler {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            shared: Arc::new(Shared::default()),
            listeners: Arc::new(Listeners::default()),
            worker: Mutex::new(None),
        }
    }

    /// Registers a callback. It runs on the playback thread.
    pub fn on_event(
        &self,
        callback: impl Fn(&PlaybackEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.register(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// Events delivered through a channel sized by the config.
    pub fn subscribe(&self) -> (ListenerId, Receiver<PlaybackEvent>) {
        self.listeners
            .subscribe(self.ctx.config().notification_capacity)
    }

    /// Starts playback from the current position.
    ///
    /// # Errors
    ///
    /// `AlreadyPlaying` if running, or when called from a listener.
    /// `NoActiveSequence` if nothing is loaded.
    pub fn play(&self) -> Result<(), PlaybackError> {
        if self.shared.on_worker_thread() {
            return Err(PlaybackError::AlreadyPlaying);
        }
        let mut worker = self.worker.lock();
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(PlaybackError::AlreadyPlaying);
        }
        reap(worker.take());

        let (sequence_id, tempo, ppq) = self
            .ctx
            .with_sequence(|s| (s.id(), s.tempo(), s.ppq()))
            .ok_or(PlaybackError::NoActiveSequence)?;
        let start_tick = self.shared.position.load(Ordering::SeqCst);

        let session = Session {
            ctx: self.ctx.clone(),
            shared: Arc::clone(&self.shared),
            listeners: Arc::clone(&self.listeners),
            sequence_id,
            interval: self.ctx.config().timer_interval(),
            start_tick,
            anchor: Instant::now(),
            anchor_tick: start_tick,
            tempo,
            ppq,
        };

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("midimix-playback".to_string())
            .spawn(move || session.run());
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                warn!(error = %err, "could not spawn playback thread");
                Err(PlaybackError::ThreadSpawn)
            }
        }
    }

    /// Stops playback and waits for the playback thread to exit. Sounding
    /// notes of the sequence are silenced.
    ///
    /// Returns false if playback was not running. From a listener the thread
    /// is only asked to stop.
    pub fn stop(&self) -> bool {
        if self.shared.on_worker_thread() {
            self.shared.stop_requested.store(true, Ordering::SeqCst);
            return self.shared.running.load(Ordering::SeqCst);
        }
        let mut worker = self.worker.lock();
        let was_running = self.shared.running.load(Ordering::SeqCst);
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        reap(worker.take());
        was_running
    }

    /// Moves the position. Playback that was running resumes from `tick`.
    pub fn seek(&self, tick: u32) -> Result<(), PlaybackError> {
        let was_running = self.stop();
        let tick = self
            .ctx
            .with_sequence(|s| tick.min(s.max_tick()))
            .unwrap_or(tick);
        self.shared.position.store(tick, Ordering::SeqCst);
        if was_running {
            self.play()
        } else {
            Ok(())
        }
    }

    pub fn position(&self) -> u32 {
        self.shared.position.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PlaybackState {
        if self.is_playing() {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reap(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            warn!("playback thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::OutputError;
    use crate::midi::NoteId;
    use crate::mixer::OutputTarget;
    use crate::output::{OutputCall, OutputTransport, RecordingOutput};
    use std::collections::HashMap;

    fn sequence_with(notes: &[(u8, u32, u32)]) -> Sequence {
        let mut sequence = Sequence::new();
        let track = sequence.add_track("Lead");
        for &(pitch, start, length) in notes {
            sequence.add_note(track, Note::new(pitch, 100, start, length));
        }
        sequence
    }

    fn context_with(sequence: Sequence) -> (EngineContext, RecordingOutput) {
        let ctx = EngineContext::new(EngineConfig::default());
        let rec = RecordingOutput::new("rec");
        ctx.router().open_output(rec.clone());
        ctx.load_sequence(sequence);
        ctx.router().route_all_tracks(OutputTarget::AllOutputs);
        (ctx, rec)
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn wait_terminal(rx: &Receiver<PlaybackEvent>) -> PlaybackEvent {
        loop {
            let event = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("playback did not end");
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[test]
    fn test_zero_length_note_orders_after_its_on() {
        let sequence = sequence_with(&[(60, 0, 10), (62, 10, 0), (64, 10, 5)]);
        let due = due_events(&sequence, 10..=10);
        let order: Vec<(u8, Edge)> = due.iter().map(|e| (e.note.pitch, e.edge)).collect();
        assert_eq!(
            order,
            vec![
                (60, Edge::Off),
                (62, Edge::On),
                (64, Edge::On),
                (62, Edge::Off)
            ]
        );
    }

    #[test]
    fn test_advance_makes_progress() {
        assert_eq!(advance(0, 0, 100), (1, false));
        assert_eq!(advance(10, 40, 100), (40, false));
        assert_eq!(advance(90, 500, 100), (100, true));
        assert_eq!(advance(100, 100, 100), (100, true));
        assert_eq!(advance(0, 0, 0), (0, true));
    }

    /// Walks the sequence with arbitrary step sizes; every edge fires once.
    #[test]
    fn test_each_edge_fires_exactly_once() {
        let mut sequence = Sequence::new();
        let track = sequence.add_track("dense");
        let mut seed: u32 = 7;
        let mut next_rand = move || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) % 97
        };
        for i in 0..60 {
            sequence.add_note(
                track,
                Note::new(40 + (i % 40) as u8, 90, next_rand() * 3, next_rand()),
            );
        }
        let timed: Vec<NoteId> = sequence.tracks()[0].notes().iter().map(|n| n.id).collect();

        for stride in [1u32, 3, 17, 250, 10_000] {
            for start in [0u32, 5] {
                let mut counts: HashMap<(NoteId, bool), u32> = HashMap::new();
                let mut last = None;
                let mut current = start;
                loop {
                    let (next, done) = advance(current, current + stride - 1, sequence.max_tick());
                    for event in due_events(&sequence, window(start, last, next)) {
                        *counts.entry((event.note.id, event.edge == Edge::On)).or_default() += 1;
                    }
                    current = next;
                    last = Some(next);
                    if done {
                        break;
                    }
                }

                for (id, note) in timed.iter().zip(sequence.tracks()[0].notes()) {
                    let (s, e) = note.span().unwrap();
                    let ons = counts.get(&(*id, true)).copied().unwrap_or(0);
                    let offs = counts.get(&(*id, false)).copied().unwrap_or(0);
                    assert_eq!(ons, u32::from(s >= start), "stride {stride} start {start}");
                    assert_eq!(offs, u32::from(e >= start), "stride {stride} start {start}");
                }
            }
        }
    }

    #[test]
    fn test_muted_track_fires_only_offs() {
        let mut sequence = sequence_with(&[(60, 0, 10)]);
        let track = sequence.tracks()[0].id;
        sequence.edit_track(track, |t| t.muted = true);
        let due = due_events(&sequence, 0..=20);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].edge, Edge::Off);
    }

    #[test]
    fn test_play_without_sequence() {
        let scheduler = PlaybackScheduler::new(EngineContext::new(EngineConfig::default()));
        assert_eq!(scheduler.play(), Err(PlaybackError::NoActiveSequence));
        assert!(!scheduler.stop());
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_plays_to_end_and_rewinds() {
        // 480 PPQ at 48 ms per quarter: 0.1 ms per tick
        let mut sequence = sequence_with(&[(60, 0, 240), (64, 240, 240)]);
        sequence.set_tempo(48_000);
        let (ctx, rec) = context_with(sequence);
        let scheduler = PlaybackScheduler::new(ctx.clone());
        let (_, rx) = scheduler.subscribe();

        scheduler.play().unwrap();
        assert_eq!(scheduler.play(), Err(PlaybackError::AlreadyPlaying));
        assert_eq!(wait_terminal(&rx), PlaybackEvent::Finished { tick: 480 });

        assert_eq!(rec.note_on_count(), 2);
        assert_eq!(rec.note_off_count(), 2);
        assert_eq!(ctx.router().playing_count(), 0);
        assert_eq!(scheduler.position(), 0);
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_finish_silences_notes_removed_mid_run() {
        let mut sequence = sequence_with(&[(60, 0, 2000), (64, 0, 4000)]);
        sequence.set_tempo(48_000);
        let removed = sequence.tracks()[0].notes()[0].id;
        let (ctx, rec) = context_with(sequence);
        let scheduler = PlaybackScheduler::new(ctx.clone());
        let (_, rx) = scheduler.subscribe();

        scheduler.play().unwrap();
        wait_until(|| rec.note_on_count() == 2);
        let track = ctx.with_sequence(|s| s.tracks()[0].id).unwrap();
        assert!(ctx
            .edit_sequence(|s| s.remove_note(track, removed))
            .flatten()
            .is_some());

        assert_eq!(wait_terminal(&rx), PlaybackEvent::Finished { tick: 4000 });
        assert_eq!(ctx.router().playing_count(), 0);
        assert_eq!(rec.note_on_count(), 2);
        assert_eq!(rec.note_off_count(), 2);
    }

    #[test]
    fn test_panicking_listener_releases_scheduler() {
        let (ctx, _rec) = context_with(sequence_with(&[(60, 0, 480 * 20)]));
        let scheduler = PlaybackScheduler::new(ctx.clone());
        let faulty = scheduler.on_event(|event| {
            if let PlaybackEvent::Position { tick } = event {
                assert!(*tick <= 5, "listener failure at tick {tick}");
            }
        });

        scheduler.play().unwrap();
        wait_until(|| !scheduler.is_playing());
        assert_eq!(scheduler.state(), PlaybackState::Stopped);
        assert_eq!(ctx.router().playing_count(), 0);

        assert!(scheduler.remove_listener(faulty));
        scheduler.play().unwrap();
        assert!(scheduler.is_playing());
        assert!(scheduler.stop());
    }

    #[test]
    fn test_stop_silences_and_keeps_position() {
        let (ctx, rec) = context_with(sequence_with(&[(60, 0, 480 * 20)]));
        let scheduler = PlaybackScheduler::new(ctx.clone());
        scheduler.play().unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert_eq!(rec.note_on_count(), 1);
        assert_eq!(rec.note_off_count(), 1);
        assert_eq!(ctx.router().playing_count(), 0);
        let position = scheduler.position();
        assert!(position > 0 && position < 480 * 20);
    }

    #[test]
    fn test_seek_while_stopped_clamps() {
        let (ctx, _rec) = context_with(sequence_with(&[(60, 0, 960)]));
        let scheduler = PlaybackScheduler::new(ctx);
        scheduler.seek(5_000).unwrap();
        assert_eq!(scheduler.position(), 960);
        scheduler.seek(100).unwrap();
        assert_eq!(scheduler.position(), 100);
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_seek_while_playing_skips_passed_notes() {
        // 0.2 ms per tick: 62 is due at 400 ms, long after the seek
        let mut sequence = sequence_with(&[(60, 0, 100), (62, 2000, 100), (64, 6000, 100)]);
        sequence.set_tempo(96_000);
        let (ctx, rec) = context_with(sequence);
        let scheduler = PlaybackScheduler::new(ctx);
        let (_, rx) = scheduler.subscribe();

        scheduler.play().unwrap();
        wait_until(|| rec.note_on_count() == 1);
        scheduler.seek(5000).unwrap();
        assert!(scheduler.is_playing());

        let finished = loop {
            match wait_terminal(&rx) {
                PlaybackEvent::Finished { tick } => break tick,
                PlaybackEvent::Stopped { .. } => continue,
                other => panic!("unexpected terminal event {other:?}"),
            }
        };
        assert_eq!(finished, 6100);

        let started: Vec<u8> = rec
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                OutputCall::NoteOn { note, .. } => Some(note),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![60, 64]);
    }

    #[test]
    fn test_replacing_sequence_ends_run() {
        let (ctx, _rec) = context_with(sequence_with(&[(60, 0, 480 * 20)]));
        let scheduler = PlaybackScheduler::new(ctx.clone());
        let (_, rx) = scheduler.subscribe();
        scheduler.play().unwrap();
        thread::sleep(Duration::from_millis(20));

        ctx.load_sequence(sequence_with(&[(72, 0, 10)]));
        assert!(matches!(wait_terminal(&rx), PlaybackEvent::Stopped { .. }));
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_listener_can_stop_playback() {
        let (ctx, _rec) = context_with(sequence_with(&[(60, 0, 480 * 20)]));
        let scheduler = Arc::new(PlaybackScheduler::new(ctx));
        let (_, rx) = scheduler.subscribe();
        let handle = Arc::downgrade(&scheduler);
        scheduler.on_event(move |event| {
            if let PlaybackEvent::Position { tick } = event {
                if *tick >= 10 {
                    if let Some(scheduler) = handle.upgrade() {
                        scheduler.stop();
                    }
                }
            }
        });

        scheduler.play().unwrap();
        assert!(matches!(wait_terminal(&rx), PlaybackEvent::Stopped { .. }));
    }

    /// Records when each call arrived.
    struct TimedOutput {
        origin: Instant,
        log: Arc<Mutex<Vec<(bool, Duration)>>>,
    }

    impl OutputTransport for TimedOutput {
        fn name(&self) -> &str {
            "timed"
        }

        fn note_on(&mut self, _: u8, _: u8, _: u8) -> Result<(), OutputError> {
            self.log.lock().push((true, self.origin.elapsed()));
            Ok(())
        }

        fn note_off(&mut self, _: u8, _: u8) -> Result<(), OutputError> {
            self.log.lock().push((false, self.origin.elapsed()));
            Ok(())
        }

        fn program_change(&mut self, _: u8, _: u8) -> Result<(), OutputError> {
            Ok(())
        }

        fn control_change(&mut self, _: u8, _: u8, _: u8) -> Result<(), OutputError> {
            Ok(())
        }
    }

    #[test]
    fn test_quarter_note_timing() {
        // 480 PPQ, 120 BPM: the off is due 500 ms after the on.
        let ctx = EngineContext::new(EngineConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        ctx.router().open_output(TimedOutput {
            origin: Instant::now(),
            log: Arc::clone(&log),
        });
        ctx.load_sequence(sequence_with(&[(60, 0, 480)]));
        ctx.router().route_all_tracks(OutputTarget::AllOutputs);

        let scheduler = PlaybackScheduler::new(ctx);
        let (_, rx) = scheduler.subscribe();
        scheduler.play().unwrap();
        wait_terminal(&rx);

        let log = log.lock();
        assert_eq!(log.len(), 2);
        let (on, on_at) = log[0];
        let (off, off_at) = log[1];
        assert!(on && !off);
        let held = off_at - on_at;
        assert!(held >= Duration::from_millis(490), "held {held:?}");
        assert!(held < Duration::from_millis(1500), "held {held:?}");
    }
}
