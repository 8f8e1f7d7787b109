//! Bell: bright inharmonic FM with a short attack, roughened by bit
//! reduction and a waveshaper, then placed in space.
//!
//! ```text
//! FmSynth(5) -> BitCrusher -> WaveShaper -> HighPass -> Delay -> Reverb -> Panner -> Volume -> bus
//! ```
//!
//! Chords are strummed: each note gets its own trigger a few milliseconds
//! after the previous one.

use tracing::debug;

use super::{fade_volume, feedback, wet, Instrument, NodeBag, MIN_PERCUSSIVE_ATTACK};
use crate::config::LayerKind;
use crate::random::Rng;
use crate::toolkit::{
    db_to_gain, Adsr, AudioToolkit, FilterMode, FmVoiceSpec, NodeId, NodeSpec, ToolkitError,
    Trigger, Waveform,
};

pub const MAX_VOICES: usize = 5;

/// Attack range in seconds. Short enough to ring, long enough not to click.
pub const ATTACK_RANGE: (f32, f32) = (0.012, 0.027);

const HARMONICITIES: [f32; 4] = [1.4, 2.76, 3.5, 5.07];

pub struct BellVoice {
    bag: NodeBag,
    synth: NodeId,
    volume: NodeId,
    strum_secs: f64,
    velocity: f32,
}

impl BellVoice {
    pub fn build(
        toolkit: &mut dyn AudioToolkit,
        rng: &mut Rng,
        destination: NodeId,
        volume_db: f32,
    ) -> Result<Self, ToolkitError> {
        let carrier = *rng
            .pick(&[Waveform::Sine, Waveform::Triangle])
            .unwrap_or(&Waveform::Sine);
        let fm = FmVoiceSpec {
            max_voices: MAX_VOICES,
            harmonicity: *rng.pick(&HARMONICITIES).unwrap_or(&3.5),
            modulation_index: rng.range(4.0, 10.0),
            carrier,
            modulator: Waveform::Sine,
            envelope: Adsr::new(
                rng.range(ATTACK_RANGE.0, ATTACK_RANGE.1)
                    .max(MIN_PERCUSSIVE_ATTACK),
                rng.range(1.0, 2.5),
                0.0,
                rng.range(1.5, 3.0),
            ),
            modulation_envelope: Adsr::new(
                MIN_PERCUSSIVE_ATTACK,
                rng.range(0.3, 0.9),
                0.1,
                rng.range(0.8, 1.5),
            ),
        };
        let crusher = NodeSpec::BitCrusher {
            bits: rng.range(6.0, 10.0).round(),
            wet: wet(rng, 0.1, 0.3),
        };
        let shaper = NodeSpec::WaveShaper {
            drive: rng.range(1.5, 3.0),
            wet: wet(rng, 0.1, 0.3),
        };
        let high_pass = NodeSpec::filter(FilterMode::HighPass, rng.range(150.0, 300.0), 0.7);
        let delay = NodeSpec::FeedbackDelay {
            delay_secs: rng.range(0.25, 0.6),
            feedback: feedback(rng, 0.3, 0.6),
            wet: wet(rng, 0.2, 0.4),
        };
        let reverb = NodeSpec::Reverb {
            decay_secs: rng.range(4.0, 9.0),
            wet: wet(rng, 0.35, 0.6),
        };
        let pan = rng.range(-0.4, 0.4);
        let strum_secs = rng.next_float(0.015, 0.06);
        let velocity = rng.range(0.5, 0.8);

        let (bag, (synth, volume)) = NodeBag::assemble(toolkit, |bag, tk| {
            let ids = bag.chain(
                tk,
                &[
                    NodeSpec::FmSynth(fm),
                    crusher,
                    shaper,
                    high_pass,
                    delay,
                    reverb,
                    NodeSpec::Panner { pan },
                    NodeSpec::gain(db_to_gain(volume_db)),
                ],
            )?;
            let volume = ids[ids.len() - 1];
            tk.connect(volume, destination)?;
            Ok((ids[0], volume))
        })?;

        Ok(Self {
            bag,
            synth,
            volume,
            strum_secs,
            velocity,
        })
    }
}

impl Instrument for BellVoice {
    fn layer(&self) -> LayerKind {
        LayerKind::Bell
    }

    fn trigger_notes(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        notes: &[f32],
        duration: f64,
        at: f64,
    ) -> Result<(), ToolkitError> {
        for (i, note) in notes.iter().enumerate() {
            let offset = i as f64 * self.strum_secs;
            let velocity = self.velocity * (1.0 - 0.1 * i as f32).max(0.5);
            let trigger = Trigger::notes(&[*note], duration, at + offset).with_velocity(velocity);
            toolkit.trigger(self.synth, &trigger)?;
        }
        Ok(())
    }

    fn set_volume(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        volume_db: f32,
        at: f64,
    ) -> Result<(), ToolkitError> {
        fade_volume(toolkit, self.volume, volume_db, at)
    }

    fn silence(&mut self, toolkit: &mut dyn AudioToolkit, at: f64) {
        if let Err(err) = toolkit.release(self.synth, at) {
            debug!(error = %err, "bell release skipped");
        }
    }

    fn dispose(&mut self, toolkit: &mut dyn AudioToolkit) {
        self.bag.release(toolkit);
    }

    fn node_count(&self) -> usize {
        self.bag.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::{LedgerToolkit, NodeKind};

    #[test]
    fn attack_stays_percussive_without_clicking() {
        for seed in 1..100 {
            let mut tk = LedgerToolkit::new();
            let mut rng = Rng::new(seed);
            let bus = tk.create(NodeSpec::gain(1.0)).unwrap();
            let voice = BellVoice::build(&mut tk, &mut rng, bus, -18.0).unwrap();
            let NodeSpec::FmSynth(fm) = tk.node(voice.synth).unwrap().spec else {
                panic!("bell synth is not FM");
            };
            assert_eq!(fm.max_voices, MAX_VOICES);
            assert!((0.012..=0.027).contains(&fm.envelope.attack));
            assert_eq!(tk.nodes_of_kind(NodeKind::BitCrusher).len(), 1);
            assert_eq!(tk.nodes_of_kind(NodeKind::WaveShaper).len(), 1);
        }
    }

    #[test]
    fn chord_is_strummed_in_order() {
        let mut tk = LedgerToolkit::new();
        let mut rng = Rng::new(21);
        let bus = tk.create(NodeSpec::gain(1.0)).unwrap();
        let mut voice = BellVoice::build(&mut tk, &mut rng, bus, -18.0).unwrap();

        voice
            .trigger_notes(&mut tk, &[523.25, 659.25, 783.99], 3.0, 2.0)
            .unwrap();
        let triggers = tk.triggers_for(voice.synth);
        assert_eq!(triggers.len(), 3);
        assert_eq!(triggers[0].at, 2.0);
        assert!(triggers.windows(2).all(|w| w[1].at > w[0].at));
        assert_eq!(triggers[2].notes.as_slice(), &[783.99]);
    }
}
