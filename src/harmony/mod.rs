//! Harmony: note math, chord pools and the per-layer chord source.

pub mod chords;
pub mod notes;

pub use chords::{ChordPool, CurrentChords, Variation};

use crate::config::LayerKind;
use crate::random::Rng;

/// Chord pools for the tonal layers plus the chords they last played.
#[derive(Debug, Clone)]
pub struct Harmony {
    drone: ChordPool,
    bell: ChordPool,
    choir: ChordPool,
    pub current: CurrentChords,
}

impl Harmony {
    /// Build every pool and shuffle each once.
    pub fn new(rng: &mut Rng) -> Self {
        let mut drone = ChordPool::from_templates(chords::DRONE_TEMPLATES, 0);
        let mut bell = ChordPool::from_templates(chords::BELL_TEMPLATES, 0);
        let mut choir = ChordPool::from_templates(chords::DRONE_TEMPLATES, 1);
        drone.shuffle(rng);
        bell.shuffle(rng);
        choir.shuffle(rng);

        Self {
            drone,
            bell,
            choir,
            current: CurrentChords::default(),
        }
    }

    /// Rebuild the pools in the order a fresh `new` with this generator
    /// state would give, forgetting the last draw of each. The chords the
    /// layers are currently holding are kept.
    pub fn reshuffle(&mut self, rng: &mut Rng) {
        let current = std::mem::take(&mut self.current);
        *self = Self::new(rng);
        self.current = current;
    }

    pub fn variation(layer: LayerKind) -> Variation {
        match layer {
            LayerKind::Drone => Variation {
                microtonal: 0.3,
                voicing: 0.25,
            },
            LayerKind::Bell => Variation {
                microtonal: 0.2,
                voicing: 0.4,
            },
            LayerKind::Choir => Variation {
                microtonal: 0.25,
                voicing: 0.2,
            },
            LayerKind::Static => Variation {
                microtonal: 0.0,
                voicing: 0.0,
            },
        }
    }

    fn pool_mut(&mut self, layer: LayerKind) -> Option<&mut ChordPool> {
        match layer {
            LayerKind::Drone => Some(&mut self.drone),
            LayerKind::Bell => Some(&mut self.bell),
            LayerKind::Choir => Some(&mut self.choir),
            LayerKind::Static => None,
        }
    }

    /// Draw, vary and remember a chord for a tonal layer. The static layer
    /// has no pool and always yields `None`.
    pub fn next_chord(&mut self, layer: LayerKind, rng: &mut Rng) -> Option<Vec<f32>> {
        let base = self.pool_mut(layer)?.next_chord(rng)?.to_vec();
        let chord = chords::vary(&base, Self::variation(layer), rng);
        let slot = match layer {
            LayerKind::Drone => &mut self.current.drone,
            LayerKind::Bell => &mut self.current.bell,
            LayerKind::Choir => &mut self.current.choir,
            LayerKind::Static => return Some(chord),
        };
        *slot = Some(chord.clone());
        Some(chord)
    }

    /// Forget what a layer last played.
    pub fn forget(&mut self, layer: LayerKind) {
        match layer {
            LayerKind::Drone => self.current.drone = None,
            LayerKind::Bell => self.current.bell = None,
            LayerKind::Choir => self.current.choir = None,
            LayerKind::Static => {}
        }
    }
}
