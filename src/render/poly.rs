//! Polyphonic two-operator FM synth used by the bell layer.
//!
//! ```text
//!  modulator (f · harmonicity) ──× mod env × index──┐
//!                                                   v
//!  carrier (f · detune) <──── frequency + deviation ┘ ──× amp env ──> out
//! ```
//!
//! Voices are allocated free-first; when every voice is busy the oldest
//! releasing voice is stolen, then the oldest sounding one.

use crate::dsp::{Envelope, Oscillator};
use crate::toolkit::FmVoiceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Free,      // Available for allocation
    Active,    // Gate high
    Releasing, // Gate low, envelope in release
}

struct FmVoice {
    state: VoiceState,
    frequency: f32,
    age: u64,
    carrier: Oscillator,
    modulator: Oscillator,
    amp: Envelope,
    modulation: Envelope,
}

impl FmVoice {
    fn new(spec: &FmVoiceSpec, sample_rate: f32) -> Self {
        Self {
            state: VoiceState::Free,
            frequency: 0.0,
            age: 0,
            carrier: Oscillator::new(),
            modulator: Oscillator::new(),
            amp: Envelope::new(spec.envelope, sample_rate),
            modulation: Envelope::new(spec.modulation_envelope, sample_rate),
        }
    }

    fn start(&mut self, frequency: f32, velocity: f32, age: u64) {
        if self.state == VoiceState::Free {
            self.carrier.reset();
            self.modulator.reset();
        }
        self.frequency = frequency;
        self.age = age;
        self.state = VoiceState::Active;
        self.amp.note_on(velocity);
        self.modulation.note_on(1.0);
    }

    fn release(&mut self) {
        if self.state == VoiceState::Active {
            self.state = VoiceState::Releasing;
            self.amp.note_off();
            self.modulation.note_off();
        }
    }
}

pub struct PolyFm {
    spec: FmVoiceSpec,
    voices: Vec<FmVoice>,
    sample_rate: f32,
    counter: u64,
    normalise: f32,
}

impl PolyFm {
    pub fn new(spec: FmVoiceSpec, sample_rate: f32) -> Self {
        let count = spec.max_voices.max(1);
        let voices = (0..count).map(|_| FmVoice::new(&spec, sample_rate)).collect();
        Self {
            spec,
            voices,
            sample_rate,
            counter: 0,
            normalise: 1.0 / (count as f32).sqrt(),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.state != VoiceState::Free)
            .count()
    }

    pub fn note_on(&mut self, frequency: f32, velocity: f32) {
        self.counter += 1;
        let age = self.counter;
        let index = self.allocate();
        self.voices[index].start(frequency, velocity, age);
    }

    /// Release the most recent sounding voice at `frequency`.
    pub fn note_off(&mut self, frequency: f32) {
        if let Some(voice) = self
            .voices
            .iter_mut()
            .filter(|v| v.state == VoiceState::Active && (v.frequency - frequency).abs() < 1e-3)
            .max_by_key(|v| v.age)
        {
            voice.release();
        }
    }

    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            voice.release();
        }
    }

    fn allocate(&self) -> usize {
        if let Some(free) = self.voices.iter().position(|v| v.state == VoiceState::Free) {
            return free;
        }
        let oldest_in = |state: VoiceState| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.state == state)
                .min_by_key(|(_, v)| v.age)
                .map(|(i, _)| i)
        };
        oldest_in(VoiceState::Releasing)
            .or_else(|| oldest_in(VoiceState::Active))
            .unwrap_or(0)
    }

    /// Render one mono sample. `detune_ratio` scales every carrier.
    #[inline]
    pub fn next_sample(&mut self, detune_ratio: f32) -> f32 {
        let spec = self.spec;
        let mut out = 0.0;
        for voice in &mut self.voices {
            if voice.state == VoiceState::Free {
                continue;
            }
            let carrier_hz = voice.frequency * detune_ratio;
            let modulator_hz = carrier_hz * spec.harmonicity;
            let deviation = voice.modulator.next_sample(spec.modulator, modulator_hz, 0.5, self.sample_rate)
                * voice.modulation.next_sample()
                * spec.modulation_index
                * modulator_hz;
            let amp = voice.amp.next_sample();
            out += voice
                .carrier
                .next_sample(spec.carrier, (carrier_hz + deviation).abs(), 0.5, self.sample_rate)
                * amp;

            if voice.state == VoiceState::Releasing && !voice.amp.is_active() {
                voice.state = VoiceState::Free;
            }
        }
        out * self.normalise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::{Adsr, Waveform};

    const SR: f32 = 48_000.0;

    fn bell(max_voices: usize) -> PolyFm {
        PolyFm::new(
            FmVoiceSpec {
                max_voices,
                harmonicity: 3.01,
                modulation_index: 12.0,
                carrier: Waveform::Sine,
                modulator: Waveform::Sine,
                envelope: Adsr::new(0.001, 1.0, 0.0, 0.1),
                modulation_envelope: Adsr::new(0.001, 0.5, 0.2, 0.1),
            },
            SR,
        )
    }

    #[test]
    fn notes_sound_and_free_after_release() {
        let mut synth = bell(4);
        synth.note_on(440.0, 1.0);
        let peak = (0..480).fold(0.0f32, |acc, _| acc.max(synth.next_sample(1.0).abs()));
        assert!(peak > 0.1);
        assert_eq!(synth.active_voices(), 1);

        synth.note_off(440.0);
        for _ in 0..(0.2 * SR) as usize {
            synth.next_sample(1.0);
        }
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn steals_oldest_releasing_voice_first() {
        let mut synth = bell(2);
        synth.note_on(100.0, 1.0);
        synth.note_on(200.0, 1.0);
        synth.note_off(100.0);
        synth.note_on(300.0, 1.0);

        let freqs: Vec<f32> = synth.voices.iter().map(|v| v.frequency).collect();
        assert!(freqs.contains(&200.0));
        assert!(freqs.contains(&300.0));
        assert!(!freqs.contains(&100.0));
    }

    #[test]
    fn full_synth_steals_oldest_active_voice() {
        let mut synth = bell(2);
        synth.note_on(100.0, 1.0);
        synth.note_on(200.0, 1.0);
        synth.note_on(300.0, 1.0);
        let freqs: Vec<f32> = synth.voices.iter().map(|v| v.frequency).collect();
        assert_eq!(freqs, vec![300.0, 200.0]);
    }

    #[test]
    fn output_stays_finite_with_heavy_modulation() {
        let mut synth = bell(6);
        for f in [110.0, 220.0, 330.0, 440.0, 550.0, 660.0] {
            synth.note_on(f, 1.0);
        }
        for _ in 0..48_000 {
            let s = synth.next_sample(1.01);
            assert!(s.is_finite());
            assert!(s.abs() < 4.0);
        }
    }
}
