//! Benchmarks for DSP primitives and the full engine.
//!
//! Run with: cargo bench
//!
//! Reference timing at 48kHz sample rate:
//!   - 64 samples  = 1.33ms deadline
//!   - 128 samples = 2.67ms deadline
//!   - 256 samples = 5.33ms deadline
//!   - 512 samples = 10.67ms deadline
//!
//! Benchmark groups:
//!   - dsp/*        Sample-level primitives (filter, reverb, dynamics, noise)
//!   - scenarios/*  Render graph with every layer live, rhythm generation

use criterion::{criterion_group, criterion_main};

mod dsp;
mod scenarios;

/// Common buffer sizes used in audio applications.
pub const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512];

pub const SAMPLE_RATE: f32 = 48_000.0;

criterion_group!(
    benches,
    dsp::bench_filter,
    dsp::bench_reverb,
    dsp::bench_dynamics,
    dsp::bench_noise,
    scenarios::bench_render,
    scenarios::bench_rhythm,
);
criterion_main!(benches);
