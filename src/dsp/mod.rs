//! Low-level DSP primitives used by the realtime render graph.
//!
//! These components are allocation-free once constructed and realtime-safe,
//! so render nodes embed them directly. They stay focused on the signal
//! math; scheduling, automation and routing live in `crate::render`.

/// Time-domain delay line with fractional reads.
pub mod delay;
/// Waveshaping and bit reduction.
pub mod distortion;
/// Compressor, limiter and peak meter.
pub mod dynamics;
/// Attack/decay/sustain/release envelope generator.
pub mod envelope;
/// State-variable filter with low/high/band-pass and peaking responses.
pub mod filter;
/// Band-limited oscillators, control-rate shapes and noise sources.
pub mod oscillator;
/// Schroeder reverb.
pub mod reverb;

pub use envelope::{Envelope, EnvelopeState};
pub use filter::{FilterResponse, SVFilter};
pub use oscillator::{NoiseSource, Oscillator};

/// Shortest stage time an envelope or ramp will accept (one sample at 48 kHz).
pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;
