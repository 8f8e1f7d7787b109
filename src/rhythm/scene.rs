//! Scenes: fixed bundles of gate, band and motion settings that the rhythm
//! engine steps through, one per phrase.

/// Immutable scene record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scene {
    pub name: &'static str,
    /// Gate attack range in seconds.
    pub attack: (f32, f32),
    /// Gate decay range in seconds, before tempo scaling.
    pub decay: (f32, f32),
    /// Band-pass resonance.
    pub q: f32,
    pub pan_depth: f32,
    pub tremolo_depth: f32,
    /// Per-step velocities, cycled by step position.
    pub accents: &'static [f32],
    /// Choir scream intensity when this scene turns scream mode on.
    pub scream_intensity: f32,
}

impl Scene {
    pub fn accent(&self, position: usize) -> f32 {
        if self.accents.is_empty() {
            return 1.0;
        }
        self.accents[position % self.accents.len()]
    }
}

pub const SCENES: &[Scene] = &[
    Scene {
        name: "dust",
        attack: (0.004, 0.006),
        decay: (0.08, 0.11),
        q: 2.5,
        pan_depth: 0.3,
        tremolo_depth: 0.15,
        accents: &[0.9, 0.5, 0.65, 0.45],
        scream_intensity: 0.2,
    },
    Scene {
        name: "wire",
        attack: (0.003, 0.004),
        decay: (0.06, 0.08),
        q: 6.0,
        pan_depth: 0.55,
        tremolo_depth: 0.3,
        accents: &[1.0, 0.4, 0.7, 0.4, 0.85, 0.4],
        scream_intensity: 0.45,
    },
    Scene {
        name: "hail",
        attack: (0.003, 0.005),
        decay: (0.07, 0.1),
        q: 4.0,
        pan_depth: 0.8,
        tremolo_depth: 0.5,
        accents: &[1.0, 0.75, 0.55, 0.9, 0.6, 0.8, 0.5, 0.7],
        scream_intensity: 0.7,
    },
    Scene {
        name: "breath",
        attack: (0.005, 0.006),
        decay: (0.09, 0.11),
        q: 1.6,
        pan_depth: 0.2,
        tremolo_depth: 0.1,
        accents: &[0.7, 0.5, 0.6],
        scream_intensity: 0.1,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenes_respect_gate_limits() {
        assert!(SCENES.len() >= 3);
        for scene in SCENES {
            assert!(scene.attack.0 >= 0.003 && scene.attack.1 <= 0.006, "{}", scene.name);
            assert!(scene.decay.0 >= 0.06 && scene.decay.1 <= 0.11, "{}", scene.name);
            assert!(scene.accents.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn accents_cycle() {
        let scene = SCENES[0];
        assert_eq!(scene.accent(0), scene.accent(scene.accents.len()));
    }
}
