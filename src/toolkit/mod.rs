//! The audio primitive interface the engine wires together.
//!
//! The engine never touches samples. It describes nodes (`NodeSpec`),
//! connects them, and schedules parameter changes and note triggers against
//! absolute clock time. Anything that implements `AudioToolkit` can host it:
//! the realtime graph in `crate::render`, or the headless `LedgerToolkit`
//! used by tests and the `simulate` command.

pub mod ledger;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ledger::{LedgerEvent, LedgerNode, LedgerToolkit};

/// Handle to a node owned by a toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolkitError {
    #[error("node {0} does not exist or was disposed")]
    UnknownNode(NodeId),

    #[error("node {node} has no {param:?} parameter")]
    InvalidParam { node: NodeId, param: Param },

    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("connecting {from} -> {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error("command queue to the audio thread is full")]
    QueueFull,

    #[error("render graph is full ({0} live nodes)")]
    GraphFull(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
    Square,
    Pulse,
}

impl Waveform {
    pub const TONAL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Sawtooth,
        Waveform::Square,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    LowPass,
    HighPass,
    BandPass,
    /// Bell-shaped boost/cut around the centre; uses `gain_db`.
    Peaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rolloff {
    Db12,
    Db24,
}

/// Envelope timings in seconds, sustain as a level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Adsr {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

/// Two-operator FM voice description shared by every voice of a poly synth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FmVoiceSpec {
    pub max_voices: usize,
    /// Modulator frequency as a multiple of the carrier.
    pub harmonicity: f32,
    pub modulation_index: f32,
    pub carrier: Waveform,
    pub modulator: Waveform,
    pub envelope: Adsr,
    pub modulation_envelope: Adsr,
}

/// Construction parameters for every node kind a toolkit must provide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeSpec {
    Oscillator {
        waveform: Waveform,
        frequency: f32,
        detune_cents: f32,
        /// Duty cycle for `Waveform::Pulse`, ignored otherwise.
        pulse_width: f32,
    },
    Noise {
        color: NoiseColor,
    },
    Filter {
        mode: FilterMode,
        frequency: f32,
        q: f32,
        gain_db: f32,
        rolloff: Rolloff,
    },
    Gain {
        gain: f32,
    },
    Reverb {
        decay_secs: f32,
        wet: f32,
    },
    FeedbackDelay {
        delay_secs: f32,
        feedback: f32,
        wet: f32,
    },
    Compressor {
        threshold_db: f32,
        ratio: f32,
        attack_secs: f32,
        release_secs: f32,
    },
    Limiter {
        ceiling_db: f32,
    },
    WaveShaper {
        drive: f32,
        wet: f32,
    },
    BitCrusher {
        bits: f32,
        wet: f32,
    },
    /// Control-rate oscillator sweeping between `min` and `max`. Its output is
    /// added to whatever parameter it modulates.
    Lfo {
        waveform: Waveform,
        rate_hz: f32,
        min: f32,
        max: f32,
    },
    Widener {
        width: f32,
    },
    Panner {
        pan: f32,
    },
    AutoPanner {
        rate_hz: f32,
        depth: f32,
    },
    Tremolo {
        rate_hz: f32,
        depth: f32,
    },
    /// Amplitude envelope applied to its input; gated with an empty trigger.
    Envelope(Adsr),
    FmSynth(FmVoiceSpec),
    Meter,
}

/// Fieldless mirror of `NodeSpec` for bookkeeping and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Oscillator,
    Noise,
    Filter,
    Gain,
    Reverb,
    FeedbackDelay,
    Compressor,
    Limiter,
    WaveShaper,
    BitCrusher,
    Lfo,
    Widener,
    Panner,
    AutoPanner,
    Tremolo,
    Envelope,
    FmSynth,
    Meter,
}

impl NodeSpec {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSpec::Oscillator { .. } => NodeKind::Oscillator,
            NodeSpec::Noise { .. } => NodeKind::Noise,
            NodeSpec::Filter { .. } => NodeKind::Filter,
            NodeSpec::Gain { .. } => NodeKind::Gain,
            NodeSpec::Reverb { .. } => NodeKind::Reverb,
            NodeSpec::FeedbackDelay { .. } => NodeKind::FeedbackDelay,
            NodeSpec::Compressor { .. } => NodeKind::Compressor,
            NodeSpec::Limiter { .. } => NodeKind::Limiter,
            NodeSpec::WaveShaper { .. } => NodeKind::WaveShaper,
            NodeSpec::BitCrusher { .. } => NodeKind::BitCrusher,
            NodeSpec::Lfo { .. } => NodeKind::Lfo,
            NodeSpec::Widener { .. } => NodeKind::Widener,
            NodeSpec::Panner { .. } => NodeKind::Panner,
            NodeSpec::AutoPanner { .. } => NodeKind::AutoPanner,
            NodeSpec::Tremolo { .. } => NodeKind::Tremolo,
            NodeSpec::Envelope(_) => NodeKind::Envelope,
            NodeSpec::FmSynth(_) => NodeKind::FmSynth,
            NodeSpec::Meter => NodeKind::Meter,
        }
    }

    /// Whether this parameter can be set, ramped or modulated on the node.
    pub fn accepts(&self, param: Param) -> bool {
        use Param::*;
        match self.kind() {
            NodeKind::Oscillator => matches!(param, Frequency | Detune | PulseWidth),
            NodeKind::Noise => matches!(param, PlaybackRate),
            NodeKind::Filter => matches!(param, Frequency | Q | Gain),
            NodeKind::Gain => matches!(param, Gain),
            NodeKind::Reverb => matches!(param, Wet),
            NodeKind::FeedbackDelay => matches!(param, DelayTime | Feedback | Wet),
            NodeKind::WaveShaper => matches!(param, Drive | Wet),
            NodeKind::BitCrusher => matches!(param, Wet),
            NodeKind::Lfo => matches!(param, Rate),
            NodeKind::Widener => matches!(param, Width),
            NodeKind::Panner => matches!(param, Pan),
            NodeKind::AutoPanner | NodeKind::Tremolo => matches!(param, Rate | Depth),
            NodeKind::FmSynth => matches!(param, Detune | Gain),
            NodeKind::Compressor | NodeKind::Limiter | NodeKind::Envelope | NodeKind::Meter => {
                false
            }
        }
    }

    /// Initial value of a parameter for this node.
    pub fn initial(&self, param: Param) -> Option<f32> {
        if !self.accepts(param) {
            return None;
        }
        let value = match (*self, param) {
            (NodeSpec::Oscillator { frequency, .. }, Param::Frequency) => frequency,
            (NodeSpec::Oscillator { detune_cents, .. }, Param::Detune) => detune_cents,
            (NodeSpec::Oscillator { pulse_width, .. }, Param::PulseWidth) => pulse_width,
            (NodeSpec::Noise { .. }, Param::PlaybackRate) => 1.0,
            (NodeSpec::Filter { frequency, .. }, Param::Frequency) => frequency,
            (NodeSpec::Filter { q, .. }, Param::Q) => q,
            (NodeSpec::Filter { gain_db, .. }, Param::Gain) => gain_db,
            (NodeSpec::Gain { gain }, Param::Gain) => gain,
            (NodeSpec::Reverb { wet, .. }, Param::Wet) => wet,
            (NodeSpec::FeedbackDelay { delay_secs, .. }, Param::DelayTime) => delay_secs,
            (NodeSpec::FeedbackDelay { feedback, .. }, Param::Feedback) => feedback,
            (NodeSpec::FeedbackDelay { wet, .. }, Param::Wet) => wet,
            (NodeSpec::WaveShaper { drive, .. }, Param::Drive) => drive,
            (NodeSpec::WaveShaper { wet, .. }, Param::Wet) => wet,
            (NodeSpec::BitCrusher { wet, .. }, Param::Wet) => wet,
            (NodeSpec::Lfo { rate_hz, .. }, Param::Rate) => rate_hz,
            (NodeSpec::Widener { width }, Param::Width) => width,
            (NodeSpec::Panner { pan }, Param::Pan) => pan,
            (NodeSpec::AutoPanner { rate_hz, .. }, Param::Rate) => rate_hz,
            (NodeSpec::AutoPanner { depth, .. }, Param::Depth) => depth,
            (NodeSpec::Tremolo { rate_hz, .. }, Param::Rate) => rate_hz,
            (NodeSpec::Tremolo { depth, .. }, Param::Depth) => depth,
            (NodeSpec::FmSynth(_), Param::Detune) => 0.0,
            (NodeSpec::FmSynth(_), Param::Gain) => 1.0,
            _ => return None,
        };
        Some(value)
    }

    /// Sources run only between `start` and `stop`.
    pub fn is_source(&self) -> bool {
        matches!(
            self.kind(),
            NodeKind::Oscillator
                | NodeKind::Noise
                | NodeKind::Lfo
                | NodeKind::AutoPanner
                | NodeKind::Tremolo
        )
    }

    /// Nodes that respond to `trigger`.
    pub fn is_triggerable(&self) -> bool {
        matches!(self.kind(), NodeKind::Envelope | NodeKind::FmSynth)
    }

    pub fn gain(gain: f32) -> Self {
        NodeSpec::Gain { gain }
    }

    pub fn filter(mode: FilterMode, frequency: f32, q: f32) -> Self {
        NodeSpec::Filter {
            mode,
            frequency,
            q,
            gain_db: 0.0,
            rolloff: Rolloff::Db12,
        }
    }

    pub fn oscillator(waveform: Waveform, frequency: f32) -> Self {
        NodeSpec::Oscillator {
            waveform,
            frequency,
            detune_cents: 0.0,
            pulse_width: 0.5,
        }
    }

    pub fn lfo(rate_hz: f32, min: f32, max: f32) -> Self {
        NodeSpec::Lfo {
            waveform: Waveform::Sine,
            rate_hz,
            min,
            max,
        }
    }
}

/// Automatable parameters. Units: Hz for `Frequency`/`Rate`, cents for
/// `Detune`, linear gain for `Gain` (dB on a peaking filter), seconds for
/// `DelayTime`, 0..1 for mixes and depths, -1..1 for `Pan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    Frequency,
    Detune,
    Q,
    Gain,
    Wet,
    Feedback,
    DelayTime,
    Drive,
    Pan,
    Depth,
    Rate,
    Width,
    PlaybackRate,
    PulseWidth,
}

impl Param {
    pub const ALL: [Param; 14] = [
        Param::Frequency,
        Param::Detune,
        Param::Q,
        Param::Gain,
        Param::Wet,
        Param::Feedback,
        Param::DelayTime,
        Param::Drive,
        Param::Pan,
        Param::Depth,
        Param::Rate,
        Param::Width,
        Param::PlaybackRate,
        Param::PulseWidth,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Upper bound on simultaneous notes in one trigger.
pub const MAX_NOTES: usize = 10;

/// Fixed-capacity list of note frequencies (Hz), cheap to copy across
/// threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Notes {
    freqs: [f32; MAX_NOTES],
    len: usize,
}

impl Notes {
    /// Keeps at most `MAX_NOTES` frequencies.
    pub fn new(freqs: &[f32]) -> Self {
        let len = freqs.len().min(MAX_NOTES);
        let mut buf = [0.0; MAX_NOTES];
        buf[..len].copy_from_slice(&freqs[..len]);
        Self { freqs: buf, len }
    }

    pub fn none() -> Self {
        Self {
            freqs: [0.0; MAX_NOTES],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.freqs[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A timed note-on/note-off pair. Empty notes gate an envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub notes: Notes,
    pub duration: f64,
    pub at: f64,
    pub velocity: f32,
}

impl Trigger {
    pub fn notes(freqs: &[f32], duration: f64, at: f64) -> Self {
        Self {
            notes: Notes::new(freqs),
            duration,
            at,
            velocity: 1.0,
        }
    }

    pub fn gate(duration: f64, at: f64) -> Self {
        Self {
            notes: Notes::none(),
            duration,
            at,
            velocity: 1.0,
        }
    }

    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn validate(&self) -> Result<(), ToolkitError> {
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ToolkitError::InvalidTrigger(format!(
                "duration must be positive, got {}",
                self.duration
            )));
        }
        if !self.at.is_finite() || self.at < 0.0 {
            return Err(ToolkitError::InvalidTrigger(format!(
                "start time must be non-negative, got {}",
                self.at
            )));
        }
        if !self.velocity.is_finite() || !(0.0..=1.0).contains(&self.velocity) {
            return Err(ToolkitError::InvalidTrigger(format!(
                "velocity must be within 0..=1, got {}",
                self.velocity
            )));
        }
        if let Some(bad) = self
            .notes
            .as_slice()
            .iter()
            .find(|f| !f.is_finite() || **f <= 0.0)
        {
            return Err(ToolkitError::InvalidTrigger(format!(
                "note frequency must be positive, got {bad}"
            )));
        }
        Ok(())
    }
}

/// The primitive library the engine is written against.
///
/// Times are absolute seconds on the toolkit clock. Every method naming a
/// node that was disposed (or never existed) returns
/// `ToolkitError::UnknownNode` instead of panicking, so callbacks that race
/// a dispose are harmless.
pub trait AudioToolkit {
    /// Current clock time in seconds.
    fn current_time(&self) -> f64;

    /// Whether the output device is running. The engine refuses to build
    /// voices while this is false.
    fn is_running(&self) -> bool;

    fn create(&mut self, spec: NodeSpec) -> Result<NodeId, ToolkitError>;

    /// Route audio from `from` into `to`.
    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), ToolkitError>;

    /// Add the output of `source` (typically an LFO) to `param` on `target`.
    fn modulate(&mut self, source: NodeId, target: NodeId, param: Param)
        -> Result<(), ToolkitError>;

    /// Route a node to the device output.
    fn connect_to_output(&mut self, node: NodeId) -> Result<(), ToolkitError>;

    fn start(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError>;

    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError>;

    fn set_param(
        &mut self,
        node: NodeId,
        param: Param,
        value: f32,
        at: f64,
    ) -> Result<(), ToolkitError>;

    /// Linear ramp from the value in effect at `at` to `target` over
    /// `duration` seconds.
    fn ramp_param(
        &mut self,
        node: NodeId,
        param: Param,
        target: f32,
        at: f64,
        duration: f64,
    ) -> Result<(), ToolkitError>;

    fn trigger(&mut self, node: NodeId, trigger: &Trigger) -> Result<(), ToolkitError>;

    /// Release every sounding note or gate on the node at `at`.
    fn release(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError>;

    /// Most recent peak level reported by a meter node, in dBFS.
    fn level_db(&self, meter: NodeId) -> Option<f32>;

    fn dispose(&mut self, node: NodeId) -> Result<(), ToolkitError>;
}

/// Decibels to linear amplitude.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Linear amplitude to decibels, floored at -120 dB.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 1e-6 {
        -120.0
    } else {
        20.0 * gain.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn db_conversions_roundtrip() {
        assert_relative_eq!(db_to_gain(0.0), 1.0);
        assert_relative_eq!(db_to_gain(-6.0), 0.501_187, epsilon = 1e-5);
        assert_relative_eq!(gain_to_db(db_to_gain(-18.0)), -18.0, epsilon = 1e-4);
        assert_eq!(gain_to_db(0.0), -120.0);
    }

    #[test]
    fn notes_truncate_to_capacity() {
        let many: Vec<f32> = (1..=20).map(|i| i as f32 * 100.0).collect();
        let notes = Notes::new(&many);
        assert_eq!(notes.len(), MAX_NOTES);
        assert_eq!(notes.as_slice()[0], 100.0);
    }

    #[test]
    fn trigger_validation_rejects_bad_values() {
        assert!(Trigger::notes(&[220.0], 1.0, 0.0).validate().is_ok());
        assert!(Trigger::notes(&[220.0], 0.0, 0.0).validate().is_err());
        assert!(Trigger::notes(&[-1.0], 1.0, 0.0).validate().is_err());
        assert!(Trigger::notes(&[f32::NAN], 1.0, 0.0).validate().is_err());
        assert!(Trigger::gate(0.1, 0.0).with_velocity(2.0).validate().is_err());
    }

    #[test]
    fn parameter_acceptance_follows_node_kind() {
        let filter = NodeSpec::filter(FilterMode::BandPass, 800.0, 4.0);
        assert!(filter.accepts(Param::Frequency));
        assert!(filter.accepts(Param::Q));
        assert!(!filter.accepts(Param::Wet));
        assert_eq!(filter.initial(Param::Q), Some(4.0));

        let limiter = NodeSpec::Limiter { ceiling_db: -6.0 };
        assert!(Param::ALL.iter().all(|p| !limiter.accepts(*p)));
    }
}
