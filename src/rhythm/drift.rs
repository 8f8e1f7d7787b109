//! Slowly evolving values.
//!
//! Two flavours, both pure state: a bounded random walk that takes one
//! `±step` per tick with a pull toward the middle of its range, and a smooth
//! drift that eases toward a target which is re-rolled now and then.

use crate::random::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomWalk {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub current: f32,
}

impl RandomWalk {
    pub fn new(min: f32, max: f32, step: f32, start: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            step: step.abs(),
            current: start.clamp(min, max),
        }
    }

    /// Move one step up or down and return the new value.
    ///
    /// At the centre both directions are equally likely; at either bound the
    /// walk moves inward three times out of four.
    pub fn tick(&mut self, rng: &mut Rng) -> f32 {
        let mid = (self.min + self.max) * 0.5;
        let half = (self.max - self.min) * 0.5;
        let pull = if half > 0.0 {
            (mid - self.current) / half
        } else {
            0.0
        };
        let p_up = 0.5 + 0.25 * pull as f64;
        let delta = if rng.chance(p_up) { self.step } else { -self.step };
        self.current = (self.current + delta).clamp(self.min, self.max);
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    /// Change the range, keeping the current value inside it.
    pub fn set_range(&mut self, min: f32, max: f32) {
        self.min = min.min(max);
        self.max = max.max(min);
        self.current = self.current.clamp(self.min, self.max);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothDrift {
    pub current: f32,
    pub target: f32,
    /// Fraction of the remaining distance covered per tick, 0..1.
    pub smoothing: f32,
}

impl SmoothDrift {
    pub fn new(start: f32, smoothing: f32) -> Self {
        Self {
            current: start,
            target: start,
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    /// Pick a new target in `[min, max)`.
    pub fn retarget(&mut self, rng: &mut Rng, min: f32, max: f32) {
        self.target = rng.range(min, max);
    }

    /// Ease toward the target and return the new value.
    pub fn tick(&mut self) -> f32 {
        self.current += (self.target - self.current) * self.smoothing;
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn walk_stays_in_bounds() {
        let mut rng = Rng::new(17);
        let mut walk = RandomWalk::new(0.1, 0.95, 0.04, 0.5);
        for _ in 0..10_000 {
            let v = walk.tick(&mut rng);
            assert!((0.1..=0.95).contains(&v));
        }
    }

    #[test]
    fn walk_moves_by_at_most_one_step() {
        let mut rng = Rng::new(4);
        let mut walk = RandomWalk::new(0.0, 10.0, 1.0, 5.0);
        let mut prev = walk.value();
        for _ in 0..500 {
            let next = walk.tick(&mut rng);
            assert!((next - prev).abs() <= 1.0 + 1e-6);
            prev = next;
        }
    }

    #[test]
    fn walk_drifts_back_from_a_bound() {
        let mut rng = Rng::new(8);
        let mut ups = 0;
        for _ in 0..2_000 {
            let mut walk = RandomWalk::new(0.0, 1.0, 0.1, 1.0);
            if walk.tick(&mut rng) >= 1.0 {
                ups += 1;
            }
        }
        // Only a quarter of the moves from the top bound go (nowhere) up.
        assert!(ups < 700, "{ups}");
    }

    #[test]
    fn drift_approaches_target() {
        let mut drift = SmoothDrift::new(0.0, 0.5);
        drift.target = 1.0;
        assert_relative_eq!(drift.tick(), 0.5);
        assert_relative_eq!(drift.tick(), 0.75);
        for _ in 0..40 {
            drift.tick();
        }
        assert_relative_eq!(drift.value(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn retarget_stays_in_range() {
        let mut rng = Rng::new(2);
        let mut drift = SmoothDrift::new(0.3, 0.2);
        for _ in 0..100 {
            drift.retarget(&mut rng, 0.25, 0.6);
            assert!((0.25..0.6).contains(&drift.target));
        }
    }
}
