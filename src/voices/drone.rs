//! Drone pad: slow FM voices through a drifting low-pass, a long delay and
//! a large reverb.
//!
//! ```text
//! FmSynth(6) -> LowPass (LFO on cutoff) -> Delay -> Reverb -> Widener -> Volume -> bus
//! ```

use tracing::debug;

use super::{fade_volume, feedback, wet, Instrument, NodeBag, MIN_PERCUSSIVE_ATTACK};
use crate::config::LayerKind;
use crate::random::Rng;
use crate::toolkit::{
    db_to_gain, Adsr, AudioToolkit, FilterMode, FmVoiceSpec, NodeId, NodeSpec, Param,
    ToolkitError, Trigger, Waveform,
};

pub const MAX_VOICES: usize = 6;

const HARMONICITIES: [f32; 4] = [0.5, 1.0, 1.5, 2.0];

pub struct DroneVoice {
    bag: NodeBag,
    synth: NodeId,
    volume: NodeId,
    velocity: f32,
}

impl DroneVoice {
    pub fn build(
        toolkit: &mut dyn AudioToolkit,
        rng: &mut Rng,
        destination: NodeId,
        volume_db: f32,
    ) -> Result<Self, ToolkitError> {
        let carrier = *rng.pick(&[Waveform::Sine, Waveform::Triangle]).unwrap_or(&Waveform::Sine);
        let fm = FmVoiceSpec {
            max_voices: MAX_VOICES,
            harmonicity: *rng.pick(&HARMONICITIES).unwrap_or(&1.0),
            modulation_index: rng.range(0.8, 3.5),
            carrier,
            modulator: Waveform::Sine,
            envelope: Adsr::new(
                rng.range(2.0, 5.0).max(MIN_PERCUSSIVE_ATTACK),
                rng.range(1.0, 3.0),
                rng.range(0.6, 0.85),
                rng.range(4.0, 8.0),
            ),
            modulation_envelope: Adsr::new(rng.range(3.0, 6.0), 2.0, 0.5, rng.range(3.0, 6.0)),
        };
        let cutoff = rng.range(600.0, 1_800.0);
        let sweep = rng.range(150.0, 400.0);
        let lfo_rate = rng.range(0.03, 0.1);
        let delay = NodeSpec::FeedbackDelay {
            delay_secs: rng.range(0.3, 0.9),
            feedback: feedback(rng, 0.2, 0.6),
            wet: wet(rng, 0.15, 0.4),
        };
        let reverb = NodeSpec::Reverb {
            decay_secs: rng.range(6.0, 12.0),
            wet: wet(rng, 0.4, 0.75),
        };
        let width = rng.range(0.5, 0.8);
        let velocity = rng.range(0.6, 0.85);

        let (bag, (synth, volume)) = NodeBag::assemble(toolkit, |bag, tk| {
            let ids = bag.chain(
                tk,
                &[
                    NodeSpec::FmSynth(fm),
                    NodeSpec::filter(FilterMode::LowPass, cutoff, 0.7),
                    delay,
                    reverb,
                    NodeSpec::Widener { width },
                    NodeSpec::gain(db_to_gain(volume_db)),
                ],
            )?;
            let lfo = bag.create(tk, NodeSpec::lfo(lfo_rate, -sweep, sweep))?;
            tk.modulate(lfo, ids[1], Param::Frequency)?;
            tk.start(lfo, 0.0)?;
            tk.connect(ids[5], destination)?;
            Ok((ids[0], ids[5]))
        })?;

        Ok(Self {
            bag,
            synth,
            volume,
            velocity,
        })
    }
}

impl Instrument for DroneVoice {
    fn layer(&self) -> LayerKind {
        LayerKind::Drone
    }

    fn trigger_notes(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        notes: &[f32],
        duration: f64,
        at: f64,
    ) -> Result<(), ToolkitError> {
        let trigger = Trigger::notes(notes, duration, at).with_velocity(self.velocity);
        toolkit.trigger(self.synth, &trigger)
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
            debug!(error = %err, "drone release skipped");
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
    use crate::voices::MAX_WET;

    #[test]
    fn builds_capped_polyphony_and_bounded_effects() {
        for seed in 1..50 {
            let mut tk = LedgerToolkit::new();
            let mut rng = Rng::new(seed);
            let bus = tk.create(NodeSpec::gain(1.0)).unwrap();
            let voice = DroneVoice::build(&mut tk, &mut rng, bus, -14.0).unwrap();

            let synth = tk.node(voice.synth).unwrap();
            match synth.spec {
                NodeSpec::FmSynth(fm) => {
                    assert_eq!(fm.max_voices, MAX_VOICES);
                    assert!(fm.envelope.attack >= 2.0);
                    assert!(fm.envelope.release >= 4.0);
                }
                other => panic!("unexpected {other:?}"),
            }
            for id in tk.nodes_of_kind(NodeKind::FeedbackDelay) {
                let fb = tk.param(id, Param::Feedback).unwrap();
                assert!(fb <= 0.85);
            }
            for id in tk.nodes_of_kind(NodeKind::Reverb) {
                assert!(tk.param(id, Param::Wet).unwrap() <= MAX_WET);
            }
            assert!(tk.reaches(voice.synth, bus));
        }
    }

    #[test]
    fn trigger_passes_chord_through() {
        let mut tk = LedgerToolkit::new();
        let mut rng = Rng::new(5);
        let bus = tk.create(NodeSpec::gain(1.0)).unwrap();
        let mut voice = DroneVoice::build(&mut tk, &mut rng, bus, -14.0).unwrap();

        voice
            .trigger_notes(&mut tk, &[65.4, 98.0, 130.8, 164.8], 12.0, 1.0)
            .unwrap();
        let triggers = tk.triggers_for(voice.synth);
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].notes.len(), 4);
        assert_eq!(triggers[0].at, 1.0);
    }
}
