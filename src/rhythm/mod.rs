//! Rhythmic static.
//!
//! Three Euclidean lanes step over the static voice at different grids. Each
//! surviving hit opens a short gate through a band-pass bank tuned to the
//! current harmony.
//!
//! ```text
//! lanes (16ths, triplet 8ths, quarters) ──hit──> density check ──> gate
//!        │                                                          │
//!        └── re-derived every few bars from drifting state          v
//!                                        static tap -> 4 x BandPass -> gate -> tremolo -> auto-pan -> bus
//! ```

pub mod drift;
pub mod engine;
pub mod euclid;
pub mod scene;

pub use drift::{RandomWalk, SmoothDrift};
pub use engine::{RhythmStats, StaticEngine};
pub use euclid::{euclid, pattern_string, rotate, PatternState};
pub use scene::{Scene, SCENES};

use serde::{Deserialize, Serialize};

/// One step sequencer's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Sixteenth,
    TripletEighth,
    Quarter,
}

impl Lane {
    pub const ALL: [Lane; 3] = [Lane::Sixteenth, Lane::TripletEighth, Lane::Quarter];

    /// Step length in beats.
    pub fn subdivision(self) -> f64 {
        match self {
            Lane::Sixteenth => 0.25,
            Lane::TripletEighth => 1.0 / 3.0,
            Lane::Quarter => 1.0,
        }
    }

    /// Pattern length before jitter.
    pub fn base_steps(self) -> usize {
        match self {
            Lane::Sixteenth => 16,
            Lane::TripletEighth => 12,
            Lane::Quarter => 8,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Every probability and period the rhythm engine uses. The values are
/// tuned by ear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmTuning {
    /// Bars between pattern re-derivations.
    pub reroll_bars: u32,
    /// Bars between scene changes.
    pub scene_bars: u32,
    /// Bars between open-window checks.
    pub window_check_bars: u32,
    pub window_probability: f64,
    /// Window length range in bars.
    pub window_bars: [u32; 2],
    /// Window sub-clock in beats.
    pub window_subdivision_beats: f64,
    pub window_fire_probability: f64,
    pub density_min: f32,
    pub density_max: f32,
    pub density_step: f32,
    pub density_start: f32,
    pub tempo_factor_min: f64,
    pub tempo_factor_max: f64,
    pub reference_bpm: f64,
    pub sprinkle_probability: f64,
    pub scream_toggle_probability: f64,
    pub scene_fade_secs: f64,
    /// Steps added or removed around each lane's base length.
    pub step_jitter: usize,
}

impl Default for RhythmTuning {
    fn default() -> Self {
        Self {
            reroll_bars: 4,
            scene_bars: 8,
            window_check_bars: 8,
            window_probability: 0.22,
            window_bars: [2, 4],
            window_subdivision_beats: 0.125,
            window_fire_probability: 0.45,
            density_min: 0.1,
            density_max: 0.95,
            density_step: 0.04,
            density_start: 0.55,
            tempo_factor_min: 0.75,
            tempo_factor_max: 1.25,
            reference_bpm: 72.0,
            sprinkle_probability: 0.05,
            scream_toggle_probability: 0.35,
            scene_fade_secs: 1.5,
            step_jitter: 1,
        }
    }
}

impl RhythmTuning {
    /// Above 1 when slower than the reference tempo, below 1 when faster.
    pub fn tempo_factor(&self, bpm: f64) -> f64 {
        if bpm <= 0.0 {
            return self.tempo_factor_max;
        }
        (self.reference_bpm / bpm).clamp(self.tempo_factor_min, self.tempo_factor_max)
    }
}
