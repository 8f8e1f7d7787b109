//! Audio-side node state.
//!
//! A `NodeSlot` is allocated on the control thread, shipped to the audio
//! thread inside a `Command::Insert`, lives in the graph's slot table while
//! the node exists, and is shipped back on the garbage ring when disposed.
//! Nothing in here allocates after construction.

use std::collections::VecDeque;
use std::f32::consts::{FRAC_PI_4, TAU};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::automation::ParamLane;
use super::poly::PolyFm;
use super::BLOCK_FRAMES;
use crate::dsp::distortion::{crush, waveshape};
use crate::dsp::dynamics::{Compressor, Limiter, PeakMeter};
use crate::dsp::oscillator::shape;
use crate::dsp::reverb::StereoReverb;
use crate::dsp::delay::DelayLine;
use crate::dsp::{Envelope, FilterResponse, NoiseSource, Oscillator, SVFilter};
use crate::toolkit::{
    FilterMode, NodeId, NodeKind, NodeSpec, Notes, Param, Rolloff, Waveform,
};

pub type Frame = [f32; 2];

/// Most sources and modulators a node can take before its lists grow.
pub const MAX_FAN_IN: usize = 32;
const GATE_CAPACITY: usize = 64;
/// Longest feedback delay the node will honour.
const MAX_DELAY_SECS: f32 = 4.0;

/// Per-frame parameter values for the node being rendered.
pub struct ParamBlock {
    values: [[f32; BLOCK_FRAMES]; Param::ALL.len()],
}

impl ParamBlock {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            values: [[0.0; BLOCK_FRAMES]; Param::ALL.len()],
        })
    }

    #[inline]
    pub fn at(&self, param: Param, frame: usize) -> f32 {
        self.values[param.index()][frame]
    }

    #[inline]
    pub fn row_mut(&mut self, param: Param) -> &mut [f32; BLOCK_FRAMES] {
        &mut self.values[param.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateKind {
    On { notes: Notes, velocity: f32 },
    Off { notes: Notes },
    ReleaseAll,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateEvent {
    pub at: u64,
    pub kind: GateKind,
}

pub enum Processor {
    Oscillator {
        osc: Oscillator,
        waveform: Waveform,
    },
    Noise(NoiseSource),
    Filter {
        mode: FilterMode,
        gain_db: f32,
        stages: usize,
        /// `[channel][stage]`
        filters: [[SVFilter; 2]; 2],
    },
    Gain,
    Reverb(Box<StereoReverb>),
    FeedbackDelay([DelayLine; 2]),
    Compressor(Compressor),
    Limiter(Limiter),
    WaveShaper,
    BitCrusher {
        bits: f32,
    },
    Lfo {
        waveform: Waveform,
        phase: f32,
        min: f32,
        max: f32,
    },
    Widener,
    Panner,
    AutoPanner {
        phase: f32,
    },
    Tremolo {
        phase: f32,
    },
    Envelope(Envelope),
    FmSynth(Box<PolyFm>),
    Meter {
        meter: PeakMeter,
        level: Arc<AtomicU32>,
    },
}

impl Processor {
    fn new(spec: &NodeSpec, sample_rate: f32, seed: u32, level: Option<Arc<AtomicU32>>) -> Self {
        match *spec {
            NodeSpec::Oscillator { waveform, .. } => Processor::Oscillator {
                // Decorrelate stacked oscillators.
                osc: Oscillator::with_phase((seed % 997) as f32 / 997.0),
                waveform,
            },
            NodeSpec::Noise { color } => Processor::Noise(NoiseSource::new(color, seed)),
            NodeSpec::Filter {
                mode,
                frequency,
                q,
                gain_db,
                rolloff,
            } => {
                let response = match mode {
                    FilterMode::LowPass => FilterResponse::LowPass,
                    FilterMode::HighPass => FilterResponse::HighPass,
                    FilterMode::BandPass => FilterResponse::BandPass,
                    FilterMode::Peaking => FilterResponse::Peaking { gain_db },
                };
                let filter = SVFilter::new(response, frequency, q);
                Processor::Filter {
                    mode,
                    gain_db,
                    stages: if rolloff == Rolloff::Db24 { 2 } else { 1 },
                    filters: [
                        [filter.clone(), filter.clone()],
                        [filter.clone(), filter],
                    ],
                }
            }
            NodeSpec::Gain { .. } => Processor::Gain,
            NodeSpec::Reverb { decay_secs, .. } => {
                Processor::Reverb(Box::new(StereoReverb::new(sample_rate, decay_secs)))
            }
            NodeSpec::FeedbackDelay { .. } => Processor::FeedbackDelay([
                DelayLine::with_max_seconds(MAX_DELAY_SECS, sample_rate),
                DelayLine::with_max_seconds(MAX_DELAY_SECS, sample_rate),
            ]),
            NodeSpec::Compressor {
                threshold_db,
                ratio,
                attack_secs,
                release_secs,
            } => Processor::Compressor(Compressor::new(
                threshold_db,
                ratio,
                attack_secs,
                release_secs,
                sample_rate,
            )),
            NodeSpec::Limiter { ceiling_db } => {
                Processor::Limiter(Limiter::new(ceiling_db, sample_rate))
            }
            NodeSpec::WaveShaper { .. } => Processor::WaveShaper,
            NodeSpec::BitCrusher { bits, .. } => Processor::BitCrusher { bits },
            NodeSpec::Lfo {
                waveform, min, max, ..
            } => Processor::Lfo {
                waveform,
                phase: 0.0,
                min,
                max,
            },
            NodeSpec::Widener { .. } => Processor::Widener,
            NodeSpec::Panner { .. } => Processor::Panner,
            NodeSpec::AutoPanner { .. } => Processor::AutoPanner { phase: 0.0 },
            NodeSpec::Tremolo { .. } => Processor::Tremolo { phase: 0.0 },
            NodeSpec::Envelope(adsr) => Processor::Envelope(Envelope::new(adsr, sample_rate)),
            NodeSpec::FmSynth(fm) => Processor::FmSynth(Box::new(PolyFm::new(fm, sample_rate))),
            NodeSpec::Meter => Processor::Meter {
                meter: PeakMeter::new(sample_rate),
                level: level.unwrap_or_else(|| Arc::new(AtomicU32::new((-120.0f32).to_bits()))),
            },
        }
    }
}

/// Start/stop window for source nodes, in frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunWindow {
    start: Option<u64>,
    stop: Option<u64>,
}

impl RunWindow {
    pub fn start(&mut self, frame: u64) {
        self.start = Some(frame);
        if self.stop.is_some_and(|stop| stop <= frame) {
            self.stop = None;
        }
    }

    pub fn stop(&mut self, frame: u64) {
        self.stop = Some(frame);
    }

    #[inline]
    pub fn is_running(&self, frame: u64) -> bool {
        self.start.is_some_and(|s| frame >= s) && self.stop.map_or(true, |t| frame < t)
    }
}

pub struct NodeSlot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub is_source: bool,
    pub processor: Processor,
    pub lanes: Vec<ParamLane>,
    /// Slot indices feeding audio into this node.
    pub inputs: Vec<usize>,
    /// `(source slot, lane index)` pairs adding control signal to a lane.
    pub modulators: Vec<(usize, usize)>,
    pub to_output: bool,
    pub window: RunWindow,
    pub gates: VecDeque<GateEvent>,
    pub buffer: Vec<Frame>,
}

impl NodeSlot {
    pub fn new(
        id: NodeId,
        spec: &NodeSpec,
        sample_rate: f32,
        seed: u32,
        level: Option<Arc<AtomicU32>>,
    ) -> Box<Self> {
        let lanes = Param::ALL
            .iter()
            .filter_map(|p| spec.initial(*p).map(|v| ParamLane::new(*p, v)))
            .collect();
        Box::new(Self {
            id,
            kind: spec.kind(),
            is_source: spec.is_source(),
            processor: Processor::new(spec, sample_rate, seed, level),
            lanes,
            inputs: Vec::with_capacity(MAX_FAN_IN),
            modulators: Vec::with_capacity(MAX_FAN_IN),
            to_output: false,
            window: RunWindow::default(),
            gates: VecDeque::with_capacity(GATE_CAPACITY),
            buffer: vec![[0.0; 2]; BLOCK_FRAMES],
        })
    }

    pub fn lane_index(&self, param: Param) -> Option<usize> {
        self.lanes.iter().position(|l| l.param() == param)
    }

    pub fn lane_mut(&mut self, param: Param) -> Option<&mut ParamLane> {
        self.lanes.iter_mut().find(|l| l.param() == param)
    }

    pub fn schedule_gate(&mut self, event: GateEvent) {
        if self.gates.len() == GATE_CAPACITY {
            self.gates.pop_front();
        }
        let index = self
            .gates
            .iter()
            .rposition(|g| g.at <= event.at)
            .map_or(0, |i| i + 1);
        self.gates.insert(index, event);
    }

    /// Forget inputs and modulators coming from a disposed slot.
    pub fn unlink(&mut self, slot: usize) {
        self.inputs.retain(|s| *s != slot);
        self.modulators.retain(|(s, _)| *s != slot);
    }

    fn apply_gate(&mut self, kind: GateKind) {
        match (&mut self.processor, kind) {
            (Processor::Envelope(env), GateKind::On { velocity, .. }) => env.note_on(velocity),
            (Processor::Envelope(env), GateKind::Off { .. } | GateKind::ReleaseAll) => {
                env.note_off()
            }
            (Processor::FmSynth(synth), GateKind::On { notes, velocity }) => {
                for f in notes.as_slice() {
                    synth.note_on(*f, velocity);
                }
            }
            (Processor::FmSynth(synth), GateKind::Off { notes }) => {
                for f in notes.as_slice() {
                    synth.note_off(*f);
                }
            }
            (Processor::FmSynth(synth), GateKind::ReleaseAll) => synth.release_all(),
            _ => {}
        }
    }

    /// Render `len` frames starting at absolute frame `start` into
    /// `self.buffer`. `input` is the summed audio of every connected node.
    pub fn render(
        &mut self,
        input: &[Frame],
        params: &ParamBlock,
        start: u64,
        len: usize,
        sample_rate: f32,
    ) {
        for n in 0..len {
            let frame = start + n as u64;
            while let Some(gate) = self.gates.front().copied() {
                if gate.at > frame {
                    break;
                }
                self.gates.pop_front();
                self.apply_gate(gate.kind);
            }

            let running = !self.is_source || self.window.is_running(frame);
            let x = input[n];
            let p = |param: Param| params.at(param, n);

            let y: Frame = match &mut self.processor {
                Processor::Oscillator { osc, waveform } => {
                    if running {
                        let freq = p(Param::Frequency) * (p(Param::Detune) / 1200.0).exp2();
                        let s = osc.next_sample(*waveform, freq, p(Param::PulseWidth), sample_rate);
                        [s, s]
                    } else {
                        [0.0, 0.0]
                    }
                }
                Processor::Noise(noise) => {
                    if running {
                        let s = noise.next_sample(p(Param::PlaybackRate));
                        [s, s]
                    } else {
                        [0.0, 0.0]
                    }
                }
                Processor::Filter {
                    mode,
                    gain_db,
                    stages,
                    filters,
                } => {
                    let cutoff = p(Param::Frequency);
                    let q = p(Param::Q);
                    let gain = if *mode == FilterMode::Peaking {
                        p(Param::Gain)
                    } else {
                        *gain_db
                    };
                    let mut out = x;
                    for (ch, chain) in filters.iter_mut().enumerate() {
                        for filter in chain.iter_mut().take(*stages) {
                            filter.set_cutoff(cutoff);
                            filter.set_q(q);
                            if *mode == FilterMode::Peaking {
                                filter.set_response(FilterResponse::Peaking { gain_db: gain });
                            }
                            out[ch] = filter.process(out[ch], sample_rate);
                        }
                    }
                    out
                }
                Processor::Gain => {
                    let g = p(Param::Gain);
                    [x[0] * g, x[1] * g]
                }
                Processor::Reverb(reverb) => reverb.process(x, p(Param::Wet)),
                Processor::FeedbackDelay(lines) => {
                    let delay = p(Param::DelayTime).clamp(0.0, MAX_DELAY_SECS) * sample_rate;
                    let feedback = p(Param::Feedback).clamp(0.0, 0.95);
                    let wet = p(Param::Wet).clamp(0.0, 1.0);
                    let mut out = [0.0; 2];
                    for (ch, line) in lines.iter_mut().enumerate() {
                        let delayed = line.read(delay);
                        line.write(x[ch] + delayed * feedback);
                        out[ch] = x[ch] * (1.0 - wet) + delayed * wet;
                    }
                    out
                }
                Processor::Compressor(comp) => comp.process(x),
                Processor::Limiter(limiter) => limiter.process(x),
                Processor::WaveShaper => {
                    let (drive, wet) = (p(Param::Drive), p(Param::Wet));
                    [waveshape(x[0], drive, wet), waveshape(x[1], drive, wet)]
                }
                Processor::BitCrusher { bits } => {
                    let wet = p(Param::Wet);
                    [crush(x[0], *bits, wet), crush(x[1], *bits, wet)]
                }
                Processor::Lfo {
                    waveform,
                    phase,
                    min,
                    max,
                } => {
                    if running {
                        let unipolar = 0.5 * (shape(*waveform, *phase, 0.5) + 1.0);
                        *phase = (*phase + p(Param::Rate) / sample_rate).fract();
                        let v = *min + (*max - *min) * unipolar;
                        [v, v]
                    } else {
                        [0.0, 0.0]
                    }
                }
                Processor::Widener => {
                    let width = p(Param::Width).clamp(0.0, 1.0);
                    let mid = 0.5 * (x[0] + x[1]);
                    let side = 0.5 * (x[0] - x[1]) * (1.0 + width);
                    [mid + side, mid - side]
                }
                Processor::Panner => equal_power(x, p(Param::Pan)),
                Processor::AutoPanner { phase } => {
                    if running {
                        let pan = p(Param::Depth).clamp(0.0, 1.0) * (TAU * *phase).sin();
                        *phase = (*phase + p(Param::Rate) / sample_rate).fract();
                        equal_power(x, pan)
                    } else {
                        x
                    }
                }
                Processor::Tremolo { phase } => {
                    if running {
                        let depth = p(Param::Depth).clamp(0.0, 1.0);
                        let g = 1.0 - depth * 0.5 * (1.0 + (TAU * *phase).sin());
                        *phase = (*phase + p(Param::Rate) / sample_rate).fract();
                        [x[0] * g, x[1] * g]
                    } else {
                        x
                    }
                }
                Processor::Envelope(env) => {
                    let g = env.next_sample();
                    [x[0] * g, x[1] * g]
                }
                Processor::FmSynth(synth) => {
                    let ratio = (p(Param::Detune) / 1200.0).exp2();
                    let s = synth.next_sample(ratio) * p(Param::Gain);
                    [s, s]
                }
                Processor::Meter { meter, .. } => meter.process(x),
            };

            self.buffer[n] = [sanitize(y[0]), sanitize(y[1])];
        }

        if let Processor::Meter { meter, level } = &self.processor {
            level.store(meter.level_db().to_bits(), Ordering::Relaxed);
        }
    }
}

/// Equal-power pan; `pan` in -1..=1.
#[inline]
fn equal_power(x: Frame, pan: f32) -> Frame {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    let mono = 0.5 * (x[0] + x[1]);
    let (l, r) = (angle.cos(), angle.sin());
    // Keep the centre at unity: cos(π/4) = sin(π/4) = 1/√2.
    [mono * l * std::f32::consts::SQRT_2, mono * r * std::f32::consts::SQRT_2]
}

#[inline]
fn sanitize(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}
