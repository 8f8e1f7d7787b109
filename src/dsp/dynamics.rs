//! Dynamics: compressor, limiter and peak meter.
//!
//! ```text
//!             ┌───────────── detector (peak, stereo-linked) ─────────┐
//!             │                                                      v
//! input ──────┴──────────────────────────> (×) <── gain computer <── level
//! ```
//!
//! Both processors are feed-forward with a stereo-linked detector so the
//! image does not shift when one side is louder. Attack and release are
//! one-pole smoothers on the gain reduction:
//!
//! ```text
//! coeff = exp(-1 / (time · sample_rate))
//! gr    = coeff · gr + (1 - coeff) · target
//! ```

use crate::toolkit::{db_to_gain, gain_to_db};

#[inline]
fn coefficient(time_secs: f32, sample_rate: f32) -> f32 {
    if time_secs <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_secs * sample_rate)).exp()
    }
}

#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    /// Current gain reduction in dB (≤ 0).
    reduction_db: f32,
}

impl Compressor {
    pub fn new(
        threshold_db: f32,
        ratio: f32,
        attack_secs: f32,
        release_secs: f32,
        sample_rate: f32,
    ) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            attack: coefficient(attack_secs, sample_rate),
            release: coefficient(release_secs, sample_rate),
            reduction_db: 0.0,
        }
    }

    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    #[inline]
    pub fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let level_db = gain_to_db(frame[0].abs().max(frame[1].abs()));
        let over = level_db - self.threshold_db;
        let target = if over > 0.0 {
            -over * (1.0 - 1.0 / self.ratio)
        } else {
            0.0
        };

        // More reduction is "attack", less is "release".
        let coeff = if target < self.reduction_db {
            self.attack
        } else {
            self.release
        };
        self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * target;

        let gain = db_to_gain(self.reduction_db);
        [frame[0] * gain, frame[1] * gain]
    }
}

/// Brick-wall peak limiter: instant attack, 50 ms release.
#[derive(Debug, Clone)]
pub struct Limiter {
    ceiling: f32,
    release: f32,
    gain: f32,
}

const LIMITER_RELEASE_SECS: f32 = 0.05;

impl Limiter {
    pub fn new(ceiling_db: f32, sample_rate: f32) -> Self {
        Self {
            ceiling: db_to_gain(ceiling_db),
            release: coefficient(LIMITER_RELEASE_SECS, sample_rate),
            gain: 1.0,
        }
    }

    #[inline]
    pub fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let peak = frame[0].abs().max(frame[1].abs());
        let needed = if peak > self.ceiling {
            self.ceiling / peak
        } else {
            1.0
        };

        if needed < self.gain {
            self.gain = needed;
        } else {
            self.gain = self.release * self.gain + (1.0 - self.release) * needed;
        }

        let out = [frame[0] * self.gain, frame[1] * self.gain];
        // The smoother can lag by a hair; never exceed the ceiling.
        [
            out[0].clamp(-self.ceiling, self.ceiling),
            out[1].clamp(-self.ceiling, self.ceiling),
        ]
    }
}

/// Peak meter with a 300 ms fall-off. Passes audio through untouched.
#[derive(Debug, Clone)]
pub struct PeakMeter {
    peak: f32,
    fall: f32,
}

const METER_FALL_SECS: f32 = 0.3;

impl PeakMeter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            peak: 0.0,
            fall: coefficient(METER_FALL_SECS, sample_rate),
        }
    }

    #[inline]
    pub fn process(&mut self, frame: [f32; 2]) -> [f32; 2] {
        let level = frame[0].abs().max(frame[1].abs());
        self.peak = if level > self.peak {
            level
        } else {
            self.peak * self.fall
        };
        frame
    }

    pub fn level_db(&self) -> f32 {
        gain_to_db(self.peak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn compressor_leaves_quiet_signals_alone() {
        let mut comp = Compressor::new(-18.0, 3.0, 0.006, 0.25, SR);
        let quiet = db_to_gain(-30.0);
        for _ in 0..4_800 {
            comp.process([quiet, quiet]);
        }
        assert!(comp.reduction_db().abs() < 1e-3);
    }

    #[test]
    fn compressor_reduces_by_ratio_above_threshold() {
        let mut comp = Compressor::new(-18.0, 3.0, 0.006, 0.25, SR);
        let loud = db_to_gain(-6.0);
        for _ in 0..48_000 {
            comp.process([loud, -loud]);
        }
        // 12 dB over at 3:1 -> 8 dB of reduction.
        assert!((comp.reduction_db() + 8.0).abs() < 0.1, "{}", comp.reduction_db());
    }

    #[test]
    fn limiter_never_exceeds_ceiling() {
        let mut limiter = Limiter::new(-6.0, SR);
        let ceiling = db_to_gain(-6.0);
        for i in 0..9_600 {
            let x = if i % 100 < 50 { 2.0 } else { -1.5 };
            let [l, r] = limiter.process([x, x * 0.5]);
            assert!(l.abs() <= ceiling + 1e-6);
            assert!(r.abs() <= ceiling + 1e-6);
        }
    }

    #[test]
    fn meter_tracks_peak_and_falls() {
        let mut meter = PeakMeter::new(SR);
        meter.process([0.5, 0.1]);
        assert!((meter.level_db() - gain_to_db(0.5)).abs() < 1e-4);
        for _ in 0..48_000 {
            meter.process([0.0, 0.0]);
        }
        assert!(meter.level_db() < -30.0);
    }
}
