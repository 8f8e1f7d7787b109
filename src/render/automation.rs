//! Sample-accurate parameter automation.
//!
//! Each automatable parameter of a render node owns a lane: the current
//! value plus a short queue of future events, ordered by start frame.
//!
//! ```text
//! value ─────┐        set(0.2)@f1        ramp(→1.0, f2..f3)
//!            v            v                  v
//!   0.5 ─────────────────┐                 ╱───── 1.0
//!                        └── 0.2 ─────────╱
//!                        f1              f2     f3
//! ```
//!
//! A ramp starts from whatever value is in effect when it begins, so a ramp
//! scheduled behind another ramp or a set composes the way the control side
//! expects. The queue is allocated once; if it ever fills, the oldest event
//! is applied immediately to make room.

use std::collections::VecDeque;

use crate::toolkit::Param;

/// Events a lane holds at once before it starts collapsing old ones.
pub const LANE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LaneEvent {
    Set { at: u64, value: f32 },
    Ramp { at: u64, end: u64, target: f32 },
}

impl LaneEvent {
    pub fn at(&self) -> u64 {
        match *self {
            LaneEvent::Set { at, .. } | LaneEvent::Ramp { at, .. } => at,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveRamp {
    start: u64,
    end: u64,
    from: f32,
    target: f32,
}

impl ActiveRamp {
    fn value_at(&self, frame: u64) -> f32 {
        if frame >= self.end {
            self.target
        } else if frame <= self.start {
            self.from
        } else {
            let progress = (frame - self.start) as f32 / (self.end - self.start) as f32;
            self.from + (self.target - self.from) * progress
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamLane {
    param: Param,
    value: f32,
    events: VecDeque<LaneEvent>,
    ramp: Option<ActiveRamp>,
}

impl ParamLane {
    pub fn new(param: Param, initial: f32) -> Self {
        Self {
            param,
            value: initial,
            events: VecDeque::with_capacity(LANE_CAPACITY),
            ramp: None,
        }
    }

    pub fn param(&self) -> Param {
        self.param
    }

    /// Value after the most recent `tick`.
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Queue an event, keeping start order. Events with equal start frames
    /// apply in arrival order.
    pub fn schedule(&mut self, event: LaneEvent) {
        if self.events.len() == LANE_CAPACITY {
            if let Some(oldest) = self.events.pop_front() {
                self.begin(oldest);
            }
        }
        let at = event.at();
        let index = self
            .events
            .iter()
            .rposition(|e| e.at() <= at)
            .map_or(0, |i| i + 1);
        self.events.insert(index, event);
    }

    fn begin(&mut self, event: LaneEvent) {
        // A new event supersedes a ramp in progress from its own start frame.
        if let Some(ramp) = self.ramp.take() {
            self.value = ramp.value_at(event.at());
        }
        match event {
            LaneEvent::Set { value, .. } => self.value = value,
            LaneEvent::Ramp { at, end, target } => {
                if end <= at {
                    self.value = target;
                } else {
                    self.ramp = Some(ActiveRamp {
                        start: at,
                        end,
                        from: self.value,
                        target,
                    });
                }
            }
        }
    }

    /// Advance to `frame` and return the value in effect there.
    #[inline]
    pub fn tick(&mut self, frame: u64) -> f32 {
        while let Some(next) = self.events.front() {
            if next.at() > frame {
                break;
            }
            let next = *next;
            self.events.pop_front();
            self.begin(next);
        }

        if let Some(ramp) = self.ramp {
            self.value = ramp.value_at(frame);
            if frame >= ramp.end {
                self.ramp = None;
            }
        }
        self.value
    }
}
