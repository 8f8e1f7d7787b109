//! Chord template pools and per-draw variation.
//!
//! Templates are written as note names and converted to Hz once, when a pool
//! is built. Each pool is shuffled once with the engine's generator, then
//! drawn from without immediate repetition. Every draw can be detuned by a
//! few cents per note and re-voiced by whole octaves.

use tracing::warn;

use super::notes::{
    fold_into_range, note_to_hz, shift_cents, shift_octaves, MAX_VOICED_HZ, MIN_VOICED_HZ,
};
use crate::random::Rng;

/// Largest microtonal offset applied to one note, in cents.
pub const MAX_DETUNE_CENTS: i32 = 15;

/// Low-register pads, four or five notes each.
pub const DRONE_TEMPLATES: &[&[&str]] = &[
    &["C2", "G2", "E3", "B3", "D4"],
    &["A1", "E2", "G2", "C3", "B3"],
    &["F2", "C3", "E3", "A3", "B3"],
    &["D2", "A2", "C3", "F3", "G3"],
    &["Eb2", "Bb2", "D3", "G3"],
    &["G2", "D3", "A3", "C4"],
    &["Bb1", "F2", "A2", "C3", "D3"],
    &["C#2", "G#2", "B2", "E3", "D#4"],
    &["Ab1", "Eb2", "G2", "C3"],
    &["F#2", "C#3", "E3", "A3", "B3"],
];

/// Bright triads for the bell layer.
pub const BELL_TEMPLATES: &[&[&str]] = &[
    &["C5", "E5", "G5"],
    &["A4", "C5", "E5"],
    &["F5", "A5", "C6"],
    &["D5", "F5", "A5"],
    &["G4", "B4", "D5"],
    &["E5", "G5", "B5"],
    &["Bb4", "D5", "F5"],
    &["Eb5", "G5", "Bb5"],
    &["B4", "D5", "F#5"],
    &["Ab4", "C5", "Eb5"],
];

/// How much a layer's chords are varied on each draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variation {
    /// Probability that each note is detuned.
    pub microtonal: f64,
    /// Probability that each note is moved by an octave.
    pub voicing: f64,
}

/// A shuffled set of chords with a memory of the last draw.
#[derive(Debug, Clone)]
pub struct ChordPool {
    chords: Vec<Vec<f32>>,
    last: Option<usize>,
}

impl ChordPool {
    /// Build a pool from note-name templates. Templates containing a name
    /// that does not parse are skipped with a warning.
    pub fn from_templates(templates: &[&[&str]], octave_shift: i32) -> Self {
        let chords = templates
            .iter()
            .filter_map(|template| {
                let chord: Option<Vec<f32>> = template
                    .iter()
                    .map(|name| note_to_hz(name).map(|hz| shift_octaves(hz, octave_shift)))
                    .collect();
                if chord.is_none() {
                    warn!(?template, "skipping chord template with an unknown note");
                }
                chord
            })
            .collect();
        Self::from_chords(chords)
    }

    pub fn from_chords(chords: Vec<Vec<f32>>) -> Self {
        Self { chords, last: None }
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    pub fn chords(&self) -> &[Vec<f32>] {
        &self.chords
    }

    /// Permute the pool in place (Fisher-Yates).
    pub fn shuffle(&mut self, rng: &mut Rng) {
        rng.shuffle(&mut self.chords);
        self.last = None;
    }

    /// Draw a chord index that differs from the previous draw whenever the
    /// pool has more than one chord.
    pub fn next_index(&mut self, rng: &mut Rng) -> Option<usize> {
        let len = self.chords.len();
        if len == 0 {
            return None;
        }
        let max = len as i32 - 1;
        let mut idx = rng.next_int(0, max) as usize;
        if len > 1 {
            while Some(idx) == self.last {
                idx = rng.next_int(0, max) as usize;
            }
        }
        self.last = Some(idx);
        Some(idx)
    }

    pub fn next_chord(&mut self, rng: &mut Rng) -> Option<&[f32]> {
        let idx = self.next_index(rng)?;
        self.chords.get(idx).map(Vec::as_slice)
    }
}

/// Detune each note with probability `intensity` by a non-zero offset of at
/// most `MAX_DETUNE_CENTS`. Notes that are not picked pass through unchanged.
pub fn microtonal_variation(chord: &[f32], intensity: f64, rng: &mut Rng) -> Vec<f32> {
    chord
        .iter()
        .map(|&hz| {
            if !rng.chance(intensity) {
                return hz;
            }
            let mut cents = rng.next_int(-MAX_DETUNE_CENTS, MAX_DETUNE_CENTS);
            if cents == 0 {
                cents = if rng.chance(0.5) { 1 } else { -1 };
            }
            shift_cents(hz, cents as f32)
        })
        .collect()
}

/// Move each note with probability `intensity` by an octave drawn from
/// {-1, 0, +1}, keeping results inside the voiced range.
pub fn random_voicing(chord: &[f32], intensity: f64, rng: &mut Rng) -> Vec<f32> {
    chord
        .iter()
        .map(|&hz| {
            if !rng.chance(intensity) {
                return hz;
            }
            let octave = rng.next_int(-1, 1);
            fold_into_range(shift_octaves(hz, octave), MIN_VOICED_HZ, MAX_VOICED_HZ)
        })
        .collect()
}

/// Apply both variations, detune first.
pub fn vary(chord: &[f32], variation: Variation, rng: &mut Rng) -> Vec<f32> {
    let detuned = microtonal_variation(chord, variation.microtonal, rng);
    random_voicing(&detuned, variation.voicing, rng)
}

/// The chords each tonal layer most recently triggered, read by the rhythm
/// engine when it retunes its band-pass bank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentChords {
    pub drone: Option<Vec<f32>>,
    pub bell: Option<Vec<f32>>,
    pub choir: Option<Vec<f32>>,
}

impl CurrentChords {
    /// First non-empty chord in choir, drone, bell order.
    pub fn retune_source(&self) -> Option<&[f32]> {
        [&self.choir, &self.drone, &self.bell]
            .into_iter()
            .flatten()
            .map(Vec::as_slice)
            .find(|chord| !chord.is_empty())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
