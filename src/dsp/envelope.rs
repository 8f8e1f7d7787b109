use super::MIN_TIME;
use crate::toolkit::Adsr;

/*
ADSR Envelope
=============

A linear ADSR envelope generator. Every sustained sound in the engine (drone
notes, choir parts, breath, the FM voices) is shaped by one of these.

Vocabulary
----------

  level       The envelope's current output value (0.0 to peak). This
              multiplies the audio signal to control its amplitude.

  peak        The level the attack climbs to: the trigger velocity. A soft
              choir entry and a loud one share the same shape at different
              heights.

  stage       Idle, Attack, Decay, Sustain or Release.

  gate        Gate high (`note_on`) starts the attack, gate low (`note_off`)
              starts the release from wherever the level is.


The Shape
---------

  Level
   peak ┐     ╱╲
        │    ╱  ╲___________
  S·pk  │   ╱               ╲
        │  ╱                 ╲
    0.0 └─╱───────────────────╲──→ Time
        Attack Decay  Sustain  Release


Retriggering
------------

Drones and the choir retrigger notes that are still sounding. Resetting the
level to zero on `note_on` would click, so the attack climbs from the
current level instead. The attack slope is kept: a retrigger from half
level takes half the attack time.

    increment = peak / (attack_time · sample_rate)

Release snapshots its starting level and sample count at `note_off` and
interpolates to exactly 0.0.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,    // Gate low, envelope inactive, level = 0
    Attack,  // Gate just went high, ramping up to peak
    Decay,   // Reached peak, ramping down to sustain level
    Sustain, // Holding at sustain level while gate is high
    Release, // Gate went low, ramping down to 0
}

#[derive(Debug, Clone)]
pub struct Envelope {
    attack_time: f32,
    decay_time: f32,
    sustain_level: f32, // fraction of peak
    release_time: f32,
    sample_rate: f32,

    stage: EnvelopeState,
    level: f32,
    peak: f32,

    release_start_level: f32,
    release_total_samples: u32,
    release_elapsed_samples: u32,
}

impl Envelope {
    pub fn new(adsr: Adsr, sample_rate: f32) -> Self {
        Self {
            attack_time: adsr.attack.max(MIN_TIME),
            decay_time: adsr.decay.max(MIN_TIME),
            sustain_level: adsr.sustain.clamp(0.0, 1.0),
            release_time: adsr.release.max(MIN_TIME),
            sample_rate,

            stage: EnvelopeState::Idle,
            level: 0.0,
            peak: 1.0,
            release_start_level: 0.0,
            release_total_samples: 1,
            release_elapsed_samples: 0,
        }
    }

    /// Gate high. Attack climbs from the current level to `velocity`.
    pub fn note_on(&mut self, velocity: f32) {
        self.peak = velocity.clamp(0.0, 1.0);
        self.stage = EnvelopeState::Attack;
        self.release_elapsed_samples = 0;
    }

    /// Gate low: start the release phase from current level.
    pub fn note_off(&mut self) {
        if self.stage == EnvelopeState::Idle {
            return;
        }

        self.release_start_level = self.level;
        self.release_total_samples = (self.release_time * self.sample_rate).round().max(1.0) as u32;
        self.release_elapsed_samples = 0;
        self.stage = EnvelopeState::Release;
    }

    /// Advance one sample and return the new level.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeState::Idle => {
                self.level = 0.0;
            }

            EnvelopeState::Attack => {
                let increment = self.peak.max(1e-3) / (self.attack_time * self.sample_rate);
                self.level += increment;

                if self.level >= self.peak {
                    self.level = self.peak;
                    self.stage = EnvelopeState::Decay;
                }
            }

            EnvelopeState::Decay => {
                let target = self.sustain_level * self.peak;
                let decrement = (self.peak - target) / (self.decay_time * self.sample_rate);
                self.level -= decrement;

                if self.level <= target {
                    self.level = target;
                    self.stage = EnvelopeState::Sustain;
                }
            }

            EnvelopeState::Sustain => {
                self.level = self.sustain_level * self.peak;
            }

            EnvelopeState::Release => {
                let progress =
                    self.release_elapsed_samples as f32 / self.release_total_samples as f32;
                self.level = (self.release_start_level * (1.0 - progress)).max(0.0);

                self.release_elapsed_samples = self.release_elapsed_samples.saturating_add(1);

                if self.release_elapsed_samples >= self.release_total_samples {
                    self.level = 0.0;
                    self.stage = EnvelopeState::Idle;
                }
            }
        }

        self.level
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeState::Idle
    }

    pub fn reset(&mut self) {
        self.stage = EnvelopeState::Idle;
        self.level = 0.0;
        self.release_elapsed_samples = 0;
        self.release_start_level = 0.0;
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn state(&self) -> EnvelopeState {
        self.stage
    }
}
