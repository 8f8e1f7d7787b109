//! Choir: a bank of detuned pulse voices shaped by a five-band formant
//! filter, with an optional breath layer and a "scream" mode.
//!
//! ```text
//! pulse + vibrato -> env ─┐
//! pulse + vibrato -> env ─┤
//!        ... (8-10)       ├─> pre ─> 5 x [BandPass (wobble) -> level] ─> sum
//! breath noise -> env ────┘                                              │
//!                                                                        v
//!           rasp noise -> BandPass -> rasp level ──> WaveShaper <── singer peak
//!                                                        │
//!                                                        v
//!                                             Reverb -> Volume -> bus
//! ```
//!
//! Scream mode never jumps: drive, shaper mix, the singer's-formant boost and
//! the rasp level are all ramped.

use tracing::{debug, trace};

use super::formants::{formant, BANDS};
use super::{fade_volume, wet, Instrument, NodeBag, Rig, MAX_WET, MIN_SUSTAINED_ATTACK};
use crate::config::LayerKind;
use crate::cue::Cue;
use crate::random::Rng;
use crate::toolkit::{
    db_to_gain, Adsr, AudioToolkit, FilterMode, NodeId, NodeSpec, NoiseColor, Param, Rolloff,
    ToolkitError, Trigger, Waveform,
};
use crate::transport::EventId;

pub use super::formants::{Register, Vowel};

pub const MIN_VOICES: i32 = 8;
pub const MAX_VOICES: i32 = 10;

/// Pitch glide range of a scream burst, in cents.
pub const BURST_GLIDE_CENTS: (f32, f32) = (80.0, 240.0);

/// Options for `ChoirVoice::scream_burst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreamBurst {
    /// Glide upward rather than downward.
    pub up: bool,
    /// 0..1
    pub intensity: f32,
}

struct ChoirPart {
    osc: NodeId,
    env: NodeId,
    detune: f32,
}

struct BandNodes {
    filter: NodeId,
    level: NodeId,
}

struct PendingRestore {
    cue: EventId,
    prior_scream: Option<f32>,
}

pub struct ChoirVoice {
    bag: NodeBag,
    parts: Vec<ChoirPart>,
    breath: Option<NodeId>,
    bands: Vec<BandNodes>,
    singer_peak: NodeId,
    shaper: NodeId,
    rasp: NodeId,
    volume: NodeId,
    vowel: Vowel,
    register: Register,
    scream: Option<f32>,
    restore: Option<PendingRestore>,
}

impl ChoirVoice {
    pub fn build(
        toolkit: &mut dyn AudioToolkit,
        rng: &mut Rng,
        destination: NodeId,
        volume_db: f32,
    ) -> Result<Self, ToolkitError> {
        let count = rng.next_int(MIN_VOICES, MAX_VOICES) as usize;
        let vowel = *rng.pick(&Vowel::ALL).unwrap_or(&Vowel::A);
        let register = *rng
            .pick(&[Register::Alto, Register::Tenor])
            .unwrap_or(&Register::Alto);
        let preset = formant(vowel, register);
        let envelope = Adsr::new(
            rng.range(0.4, 1.2).max(MIN_SUSTAINED_ATTACK),
            0.6,
            0.8,
            rng.range(1.5, 3.0),
        );
        let with_breath = rng.chance(0.6);
        let reverb = NodeSpec::Reverb {
            decay_secs: rng.range(5.0, 9.0),
            wet: wet(rng, 0.4, 0.65),
        };
        let peak_hz = rng.range(2_800.0, 3_200.0);

        let (bag, parts) = NodeBag::assemble(toolkit, |bag, tk| {
            let pre = bag.create(tk, NodeSpec::gain(1.5 / count as f32))?;

            let mut parts = Vec::with_capacity(count);
            for _ in 0..count {
                let detune = rng.range(-8.0, 8.0);
                let osc = bag.create(
                    tk,
                    NodeSpec::Oscillator {
                        waveform: Waveform::Pulse,
                        frequency: 220.0,
                        detune_cents: detune,
                        pulse_width: rng.range(0.3, 0.5),
                    },
                )?;
                let env = bag.create(tk, NodeSpec::Envelope(envelope))?;
                let depth = rng.range(6.0, 14.0);
                let vibrato = bag.create(tk, NodeSpec::lfo(rng.range(4.5, 6.0), -depth, depth))?;
                tk.connect(osc, env)?;
                tk.connect(env, pre)?;
                tk.modulate(vibrato, osc, Param::Detune)?;
                tk.start(osc, 0.0)?;
                tk.start(vibrato, 0.0)?;
                parts.push(ChoirPart { osc, env, detune });
            }

            let breath = if with_breath {
                let ids = bag.chain(
                    tk,
                    &[
                        NodeSpec::Noise {
                            color: NoiseColor::Pink,
                        },
                        NodeSpec::filter(FilterMode::BandPass, 2_500.0, 1.0),
                        NodeSpec::gain(rng.range(0.02, 0.05)),
                        NodeSpec::Envelope(envelope),
                    ],
                )?;
                tk.connect(ids[3], pre)?;
                tk.start(ids[0], 0.0)?;
                Some(ids[3])
            } else {
                None
            };

            let sum = bag.create(tk, NodeSpec::gain(1.0))?;
            let mut bands = Vec::with_capacity(BANDS);
            for band in 0..BANDS {
                let filter = bag.create(
                    tk,
                    NodeSpec::Filter {
                        mode: FilterMode::BandPass,
                        frequency: preset.freqs[band],
                        q: preset.q(band),
                        gain_db: 0.0,
                        rolloff: Rolloff::Db12,
                    },
                )?;
                let level = bag.create(tk, NodeSpec::gain(db_to_gain(preset.levels_db[band])))?;
                let swing = preset.freqs[band] * rng.range(0.01, 0.03);
                let wobble = bag.create(tk, NodeSpec::lfo(rng.range(0.05, 0.2), -swing, swing))?;
                tk.connect(pre, filter)?;
                tk.connect(filter, level)?;
                tk.connect(level, sum)?;
                tk.modulate(wobble, filter, Param::Frequency)?;
                tk.start(wobble, 0.0)?;
                bands.push(BandNodes { filter, level });
            }

            let tail = bag.chain(
                tk,
                &[
                    NodeSpec::Filter {
                        mode: FilterMode::Peaking,
                        frequency: peak_hz,
                        q: 1.2,
                        gain_db: 0.0,
                        rolloff: Rolloff::Db12,
                    },
                    NodeSpec::WaveShaper {
                        drive: 1.0,
                        wet: 0.0,
                    },
                    reverb,
                    NodeSpec::gain(db_to_gain(volume_db)),
                ],
            )?;
            tk.connect(sum, tail[0])?;
            tk.connect(tail[3], destination)?;

            let rasp = bag.chain(
                tk,
                &[
                    NodeSpec::Noise {
                        color: NoiseColor::White,
                    },
                    NodeSpec::filter(FilterMode::BandPass, 1_500.0, 0.8),
                    NodeSpec::gain(0.0),
                ],
            )?;
            tk.connect(rasp[2], tail[1])?;
            tk.start(rasp[0], 0.0)?;

            Ok((parts, breath, bands, tail, rasp[2]))
        })?;
        let (parts, breath, bands, tail, rasp) = parts;

        Ok(Self {
            bag,
            parts,
            breath,
            bands,
            singer_peak: tail[0],
            shaper: tail[1],
            rasp,
            volume: tail[3],
            vowel,
            register,
            scream: None,
            restore: None,
        })
    }

    pub fn voice_count(&self) -> usize {
        self.parts.len()
    }

    pub fn vowel(&self) -> (Vowel, Register) {
        (self.vowel, self.register)
    }

    /// Scream intensity while scream mode is on.
    pub fn scream(&self) -> Option<f32> {
        self.scream
    }

    pub fn has_breath(&self) -> bool {
        self.breath.is_some()
    }

    /// Morph the formant bank to another preset over `glide` seconds.
    pub fn set_vowel(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        vowel: Vowel,
        register: Register,
        at: f64,
        glide: f64,
    ) -> Result<(), ToolkitError> {
        let preset = formant(vowel, register);
        for (band, nodes) in self.bands.iter().enumerate() {
            toolkit.ramp_param(nodes.filter, Param::Frequency, preset.freqs[band], at, glide)?;
            toolkit.ramp_param(nodes.filter, Param::Q, preset.q(band), at, glide)?;
            toolkit.ramp_param(
                nodes.level,
                Param::Gain,
                db_to_gain(preset.levels_db[band]),
                at,
                glide,
            )?;
        }
        debug!(?vowel, ?register, "choir vowel");
        self.vowel = vowel;
        self.register = register;
        Ok(())
    }

    /// Scream state once any pending burst has been restored.
    pub fn settled_scream(&self) -> Option<f32> {
        match &self.restore {
            Some(pending) => pending.prior_scream,
            None => self.scream,
        }
    }

    /// Ramp scream mode on (with `intensity` in 0..1) or off.
    ///
    /// While a scream burst is pending the burst keeps its forced scream;
    /// the new state is applied when the burst restores.
    pub fn set_scream(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        on: bool,
        intensity: f32,
        at: f64,
        ramp: f64,
    ) -> Result<(), ToolkitError> {
        if let Some(pending) = self.restore.as_mut() {
            pending.prior_scream = on.then_some(intensity.clamp(0.0, 1.0));
            trace!(on, intensity, "choir scream deferred until burst restore");
            return Ok(());
        }
        self.apply_scream(toolkit, on, intensity, at, ramp)
    }

    fn apply_scream(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        on: bool,
        intensity: f32,
        at: f64,
        ramp: f64,
    ) -> Result<(), ToolkitError> {
        let intensity = if on { intensity.clamp(0.0, 1.0) } else { 0.0 };
        let drive = 1.0 + 5.0 * intensity;
        let mix = if on {
            (0.25 + 0.5 * intensity).min(MAX_WET)
        } else {
            0.0
        };
        let peak_db = if on { 3.0 + 9.0 * intensity } else { 0.0 };
        let rasp = 0.08 * intensity;

        toolkit.ramp_param(self.shaper, Param::Drive, drive, at, ramp)?;
        toolkit.ramp_param(self.shaper, Param::Wet, mix, at, ramp)?;
        toolkit.ramp_param(self.singer_peak, Param::Gain, peak_db, at, ramp)?;
        toolkit.ramp_param(self.rasp, Param::Gain, rasp, at, ramp)?;

        trace!(on, intensity, "choir scream");
        self.scream = on.then_some(intensity);
        Ok(())
    }

    /// Sing `note` for `duration` seconds with scream forced on and a pitch
    /// glide of 80-240 cents, then restore the previous scream state.
    pub fn scream_burst(
        &mut self,
        rig: &mut Rig<'_>,
        note: f32,
        duration: f64,
        options: ScreamBurst,
        at: f64,
    ) -> Result<(), ToolkitError> {
        let prior_scream = match self.restore.take() {
            Some(pending) => {
                rig.transport.cancel(pending.cue);
                pending.prior_scream
            }
            None => self.scream,
        };

        let glide = rig.rng.range(BURST_GLIDE_CENTS.0, BURST_GLIDE_CENTS.1);
        let glide = if options.up { glide } else { -glide };
        let tk = &mut *rig.toolkit;

        self.apply_scream(tk, true, options.intensity, at, 0.08)?;
        for part in &self.parts {
            tk.set_param(part.osc, Param::Frequency, note, at)?;
            tk.set_param(part.osc, Param::Detune, part.detune, at)?;
            tk.ramp_param(
                part.osc,
                Param::Detune,
                part.detune + glide,
                at + 0.05,
                duration * 0.7,
            )?;
            tk.trigger(part.env, &Trigger::gate(duration, at))?;
        }

        let cue = rig
            .transport
            .schedule_once(at + duration, Cue::ChoirBurstRestore);
        self.restore = Some(PendingRestore { cue, prior_scream });
        debug!(note, glide_cents = glide, duration, "choir scream burst");
        Ok(())
    }

    /// Undo a scream burst. Does nothing if no burst is pending.
    pub fn restore_after_burst(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        now: f64,
    ) -> Result<(), ToolkitError> {
        let Some(pending) = self.restore.take() else {
            return Ok(());
        };
        match pending.prior_scream {
            Some(intensity) => self.apply_scream(toolkit, true, intensity, now, 0.4)?,
            None => self.apply_scream(toolkit, false, 0.0, now, 0.4)?,
        }
        for part in &self.parts {
            toolkit.ramp_param(part.osc, Param::Detune, part.detune, now, 0.3)?;
        }
        Ok(())
    }

    /// Id of the pending restore cue, if a burst is in flight.
    pub fn pending_restore(&self) -> Option<EventId> {
        self.restore.as_ref().map(|p| p.cue)
    }
}

impl Instrument for ChoirVoice {
    fn layer(&self) -> LayerKind {
        LayerKind::Choir
    }

    fn trigger_notes(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        notes: &[f32],
        duration: f64,
        at: f64,
    ) -> Result<(), ToolkitError> {
        if notes.is_empty() {
            return Ok(());
        }
        for (i, part) in self.parts.iter().enumerate() {
            let note = notes[i % notes.len()];
            let onset = at + 0.012 * i as f64;
            toolkit.set_param(part.osc, Param::Frequency, note, onset)?;
            toolkit.trigger(part.env, &Trigger::gate(duration, onset))?;
        }
        if let Some(breath) = self.breath {
            toolkit.trigger(breath, &Trigger::gate(duration, at))?;
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
        let envs = self.parts.iter().map(|p| p.env).chain(self.breath);
        for env in envs {
            if let Err(err) = toolkit.release(env, at) {
                debug!(error = %err, "choir release skipped");
            }
        }
    }

    fn dispose(&mut self, toolkit: &mut dyn AudioToolkit) {
        self.restore = None;
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
    use crate::transport::{TempoParam, Transport};

    fn build(seed: u32) -> (LedgerToolkit, ChoirVoice) {
        let mut tk = LedgerToolkit::new();
        let mut rng = Rng::new(seed);
        let bus = tk.create(NodeSpec::gain(1.0)).unwrap();
        let voice = ChoirVoice::build(&mut tk, &mut rng, bus, -20.0).unwrap();
        (tk, voice)
    }

    #[test]
    fn voice_bank_and_formants() {
        for seed in 1..40 {
            let (tk, voice) = build(seed);
            assert!((8..=10).contains(&voice.voice_count()));
            assert_eq!(voice.bands.len(), BANDS);
            let pulses = tk
                .nodes_of_kind(NodeKind::Oscillator)
                .into_iter()
                .filter(|id| {
                    matches!(
                        tk.node(*id).unwrap().spec,
                        NodeSpec::Oscillator {
                            waveform: Waveform::Pulse,
                            ..
                        }
                    )
                })
                .count();
            assert_eq!(pulses, voice.voice_count());
            for part in &voice.parts {
                let NodeSpec::Envelope(adsr) = tk.node(part.env).unwrap().spec else {
                    panic!("part envelope missing");
                };
                assert!(adsr.attack >= MIN_SUSTAINED_ATTACK);
            }
        }
    }

    #[test]
    fn vowel_change_is_ramped() {
        let (mut tk, mut voice) = build(3);
        voice
            .set_vowel(&mut tk, Vowel::I, Register::Soprano, 4.0, 1.5)
            .unwrap();
        let target = formant(Vowel::I, Register::Soprano);
        for (band, nodes) in voice.bands.iter().enumerate() {
            let ramps = tk.ramps_for(nodes.filter, Param::Frequency);
            assert_eq!(ramps, vec![(4.0, 1.5, target.freqs[band])]);
        }
        assert_eq!(voice.vowel(), (Vowel::I, Register::Soprano));
    }

    #[test]
    fn scream_ramps_every_stage_and_caps_mix() {
        let (mut tk, mut voice) = build(4);
        voice.set_scream(&mut tk, true, 1.0, 2.0, 0.5).unwrap();
        assert_eq!(voice.scream(), Some(1.0));
        assert!(tk.param(voice.shaper, Param::Wet).unwrap() <= MAX_WET);
        assert_eq!(tk.ramps_for(voice.singer_peak, Param::Gain).len(), 1);
        assert!(tk.param(voice.rasp, Param::Gain).unwrap() > 0.0);

        voice.set_scream(&mut tk, false, 1.0, 3.0, 0.5).unwrap();
        assert_eq!(voice.scream(), None);
        assert_eq!(tk.param(voice.rasp, Param::Gain), Some(0.0));
    }

    #[test]
    fn burst_glides_and_restores_previous_state() {
        let (mut tk, mut voice) = build(5);
        let mut rng = Rng::new(1);
        let mut transport: Transport<Cue> = Transport::new(TempoParam::new(72.0, 60.0, 96.0));

        {
            let mut rig = Rig {
                toolkit: &mut tk,
                rng: &mut rng,
                transport: &mut transport,
            };
            let opts = ScreamBurst {
                up: true,
                intensity: 0.8,
            };
            voice.scream_burst(&mut rig, 330.0, 1.0, opts, 1.0).unwrap();
            voice.scream_burst(&mut rig, 392.0, 1.0, opts, 1.5).unwrap();
        }
        assert_eq!(voice.scream(), Some(0.8));
        assert_eq!(transport.pending(), 1);

        let part = &voice.parts[0];
        let glides = tk.ramps_for(part.osc, Param::Detune);
        let cents = glides[0].2 - part.detune;
        assert!((80.0..=240.0).contains(&cents), "{cents}");

        let fired = transport.pop_due(10.0).unwrap();
        assert_eq!(fired.cue, Cue::ChoirBurstRestore);
        assert_eq!(fired.time, 2.5);
        voice.restore_after_burst(&mut tk, fired.time).unwrap();
        assert_eq!(voice.scream(), None);
        assert!(voice.pending_restore().is_none());
    }

    #[test]
    fn scream_change_during_burst_lands_on_restore() {
        let (mut tk, mut voice) = build(6);
        let mut rng = Rng::new(2);
        let mut transport: Transport<Cue> = Transport::new(TempoParam::new(72.0, 60.0, 96.0));
        voice.set_scream(&mut tk, true, 0.5, 0.0, 0.1).unwrap();

        let opts = ScreamBurst {
            up: false,
            intensity: 0.9,
        };
        {
            let mut rig = Rig {
                toolkit: &mut tk,
                rng: &mut rng,
                transport: &mut transport,
            };
            voice.scream_burst(&mut rig, 330.0, 2.0, opts, 1.0).unwrap();
        }

        voice.set_scream(&mut tk, false, 0.0, 1.5, 0.5).unwrap();
        assert_eq!(voice.scream(), Some(0.9), "burst keeps its forced scream");
        assert_eq!(voice.settled_scream(), None);

        let fired = transport.pop_due(10.0).unwrap();
        voice.restore_after_burst(&mut tk, fired.time).unwrap();
        assert_eq!(voice.scream(), None);
        assert_eq!(tk.param(voice.rasp, Param::Gain), Some(0.0));

        {
            let mut rig = Rig {
                toolkit: &mut tk,
                rng: &mut rng,
                transport: &mut transport,
            };
            voice.scream_burst(&mut rig, 330.0, 1.0, opts, 5.0).unwrap();
        }
        voice.set_scream(&mut tk, true, 0.3, 5.5, 0.5).unwrap();
        let fired = transport.pop_due(10.0).unwrap();
        voice.restore_after_burst(&mut tk, fired.time).unwrap();
        assert_eq!(voice.scream(), Some(0.3));
    }
}
