//! Transport - one clock, many scheduled cues.
//!
//! Everything time-based in the engine (chord loops, pattern steps, bursts,
//! tempo cycles) is a cue scheduled against transport time. Nothing runs on
//! its own timer: the host advances the clock and the engine fires whatever
//! became due, in order.
//!
//! # Ordering
//!
//! ```text
//! schedule_once(2.0, A)   seq 0
//! schedule_once(1.0, B)   seq 1
//! schedule_once(2.0, C)   seq 2
//!
//! pop order: B (1.0), A (2.0, seq 0), C (2.0, seq 2)
//! ```
//!
//! Cues due at the same instant fire in the order they were scheduled.
//! Repeating cues keep their `EventId` across repeats, so one `cancel`
//! removes every future occurrence.
//!
//! # Tempo
//!
//! The tempo is a parameter on the clock with linear ramps, independent of
//! any cue. Beat-based intervals are converted to seconds with the tempo in
//! effect at the moment each repeat is rescheduled.

pub mod tempo;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub use tempo::TempoController;

/// Handle to a scheduled cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

/// Repeat interval for `schedule_repeat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interval {
    Seconds(f64),
    /// Quarter-note beats at the current tempo.
    Beats(f64),
}

/// Tempo in BPM with linear ramps, clamped to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoParam {
    min: f64,
    max: f64,
    from: (f64, f64),
    to: (f64, f64),
}

impl TempoParam {
    pub fn new(bpm: f64, min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let bpm = bpm.clamp(min, max);
        Self {
            min,
            max,
            from: (0.0, bpm),
            to: (0.0, bpm),
        }
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Tempo in effect at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        let (t0, v0) = self.from;
        let (t1, v1) = self.to;
        if time <= t0 {
            v0
        } else if time >= t1 {
            v1
        } else {
            let progress = (time - t0) / (t1 - t0);
            v0 + (v1 - v0) * progress
        }
    }

    /// Jump to `bpm` at `at`.
    pub fn set(&mut self, bpm: f64, at: f64) {
        let bpm = bpm.clamp(self.min, self.max);
        self.from = (at, bpm);
        self.to = (at, bpm);
    }

    /// Ramp linearly from the value in effect at `at` to `bpm` over
    /// `duration` seconds. Replaces any ramp still in progress.
    pub fn ramp_to(&mut self, bpm: f64, at: f64, duration: f64) {
        let start = self.value_at(at);
        let bpm = bpm.clamp(self.min, self.max);
        self.from = (at, start);
        self.to = (at + duration.max(0.0), bpm);
    }

    /// Where the current ramp ends, as `(time, bpm)`.
    pub fn target(&self) -> (f64, f64) {
        self.to
    }

    pub fn seconds_per_beat(&self, at: f64) -> f64 {
        60.0 / self.value_at(at)
    }
}

struct Entry<E> {
    time: f64,
    seq: u64,
    id: EventId,
    repeat: Option<Interval>,
    cue: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    // Reversed so the max-heap pops the earliest (time, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A cue that became due.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<E> {
    pub time: f64,
    pub id: EventId,
    pub cue: E,
}

/// Cooperative scheduler over a payload type `E`.
pub struct Transport<E> {
    queue: BinaryHeap<Entry<E>>,
    next_seq: u64,
    next_id: u64,
    now: f64,
    running: bool,
    pub tempo: TempoParam,
}

impl<E: Clone> Transport<E> {
    pub fn new(tempo: TempoParam) -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            next_id: 0,
            now: 0.0,
            running: false,
            tempo,
        }
    }

    /// Time of the most recently fired cue.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn push(&mut self, time: f64, id: EventId, repeat: Option<Interval>, cue: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry {
            time,
            seq,
            id,
            repeat,
            cue,
        });
    }

    fn fresh_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn schedule_once(&mut self, at: f64, cue: E) -> EventId {
        let id = self.fresh_id();
        self.push(at, id, None, cue);
        id
    }

    /// Fire `cue` at `start` and every `interval` after that until cancelled.
    pub fn schedule_repeat(&mut self, interval: Interval, start: f64, cue: E) -> EventId {
        let id = self.fresh_id();
        self.push(start, id, Some(interval), cue);
        id
    }

    /// Remove every pending occurrence of `id`. Returns whether anything was
    /// removed; cancelling twice is harmless.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|entry| entry.id != id);
        self.queue.len() != before
    }

    /// Remove every pending cue matching `pred`.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&E) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|entry| !pred(&entry.cue));
        before - self.queue.len()
    }

    pub fn cancel_all(&mut self) {
        self.queue.clear();
    }

    /// Time of the next pending cue.
    pub fn next_due(&self) -> Option<f64> {
        self.queue.peek().map(|entry| entry.time)
    }

    fn interval_secs(&self, interval: Interval, at: f64) -> f64 {
        let secs = match interval {
            Interval::Seconds(secs) => secs,
            Interval::Beats(beats) => beats * self.tempo.seconds_per_beat(at),
        };
        // A zero interval would fire forever within one advance.
        secs.max(1e-3)
    }

    /// Pop the earliest cue due at or before `until`, rescheduling it first
    /// if it repeats.
    pub fn pop_due(&mut self, until: f64) -> Option<Fired<E>> {
        if self.queue.peek()?.time > until {
            return None;
        }
        let entry = self.queue.pop()?;
        self.now = self.now.max(entry.time);

        if let Some(interval) = entry.repeat {
            let next = entry.time + self.interval_secs(interval, entry.time);
            self.push(next, entry.id, Some(interval), entry.cue.clone());
        }

        Some(Fired {
            time: entry.time,
            id: entry.id,
            cue: entry.cue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn transport() -> Transport<&'static str> {
        Transport::new(TempoParam::new(120.0, 60.0, 180.0))
    }

    fn drain(t: &mut Transport<&'static str>, until: f64) -> Vec<(f64, &'static str)> {
        let mut out = Vec::new();
        while let Some(fired) = t.pop_due(until) {
            out.push((fired.time, fired.cue));
        }
        out
    }

    #[test]
    fn fires_in_time_then_schedule_order() {
        let mut t = transport();
        t.schedule_once(2.0, "a");
        t.schedule_once(1.0, "b");
        t.schedule_once(2.0, "c");
        t.schedule_once(5.0, "late");

        assert_eq!(drain(&mut t, 2.0), vec![(1.0, "b"), (2.0, "a"), (2.0, "c")]);
        assert_eq!(t.pending(), 1);
        assert_eq!(t.now(), 2.0);
    }

    #[test]
    fn repeating_cue_until_cancelled() {
        let mut t = transport();
        let id = t.schedule_repeat(Interval::Seconds(0.5), 0.0, "tick");
        assert_eq!(drain(&mut t, 1.2).len(), 3);

        assert!(t.cancel(id));
        assert!(!t.cancel(id));
        assert!(drain(&mut t, 10.0).is_empty());
    }

    #[test]
    fn beat_interval_follows_tempo() {
        let mut t = transport();
        t.schedule_repeat(Interval::Beats(1.0), 0.0, "beat");
        let times: Vec<f64> = drain(&mut t, 1.6).into_iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5]);

        t.tempo.set(60.0, 1.6);
        let next: Vec<f64> = drain(&mut t, 4.1).into_iter().map(|(t, _)| t).collect();
        // 2.0 was already queued at 120 BPM; after that one beat is a second.
        assert_eq!(next, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn cancel_where_filters_by_payload() {
        let mut t = transport();
        t.schedule_once(1.0, "loop");
        t.schedule_once(1.0, "burst");
        t.schedule_repeat(Interval::Seconds(1.0), 0.0, "loop");
        assert_eq!(t.cancel_where(|cue| *cue == "loop"), 2);
        assert_eq!(drain(&mut t, 10.0), vec![(1.0, "burst")]);
    }

    #[test]
    fn tempo_ramp_interpolates_and_clamps() {
        let mut tempo = TempoParam::new(90.0, 60.0, 120.0);
        tempo.ramp_to(110.0, 10.0, 10.0);
        assert_relative_eq!(tempo.value_at(5.0), 90.0);
        assert_relative_eq!(tempo.value_at(15.0), 100.0);
        assert_relative_eq!(tempo.value_at(25.0), 110.0);

        tempo.ramp_to(500.0, 15.0, 5.0);
        assert_relative_eq!(tempo.value_at(15.0), 100.0);
        assert_relative_eq!(tempo.value_at(30.0), 120.0);

        tempo.set(10.0, 40.0);
        assert_relative_eq!(tempo.value_at(41.0), 60.0);
    }
}
