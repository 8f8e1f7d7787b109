//! Benchmarks for sample-level primitives.

use std::hint::black_box;

use ambient_drift::dsp::dynamics::{Compressor, Limiter};
use ambient_drift::dsp::reverb::StereoReverb;
use ambient_drift::dsp::{NoiseSource, SVFilter};
use ambient_drift::toolkit::NoiseColor;
use criterion::{BenchmarkId, Criterion};

use crate::{BLOCK_SIZES, SAMPLE_RATE};

fn ramp(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (i as f32 / size as f32) * 2.0 - 1.0)
        .collect()
}

pub fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/filter");

    for &size in BLOCK_SIZES {
        let input = ramp(size);

        let mut filter = SVFilter::lowpass(4_500.0);
        let mut buffer = input.clone();
        group.bench_with_input(BenchmarkId::new("lowpass", size), &size, |b, _| {
            b.iter(|| {
                buffer.copy_from_slice(&input);
                filter.render(black_box(&mut buffer), SAMPLE_RATE);
            })
        });

        // Formant-style: five narrow bands summed.
        let mut bank: Vec<SVFilter> = [700.0, 1_220.0, 2_600.0, 3_200.0, 4_000.0]
            .iter()
            .map(|hz| SVFilter::bandpass(*hz, 12.0))
            .collect();
        let mut out = vec![0.0f32; size];
        group.bench_with_input(BenchmarkId::new("formant_bank", size), &size, |b, _| {
            b.iter(|| {
                out.fill(0.0);
                for filter in bank.iter_mut() {
                    for (o, x) in out.iter_mut().zip(&input) {
                        *o += filter.process(*x, SAMPLE_RATE);
                    }
                }
                black_box(&out);
            })
        });
    }
    group.finish();
}

pub fn bench_reverb(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/reverb");

    for &size in BLOCK_SIZES {
        let input = ramp(size);
        let mut reverb = StereoReverb::new(SAMPLE_RATE, 4.0);
        group.bench_with_input(BenchmarkId::new("stereo", size), &size, |b, _| {
            b.iter(|| {
                for x in &input {
                    black_box(reverb.process([*x, *x], 0.4));
                }
            })
        });
    }
    group.finish();
}

pub fn bench_dynamics(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/dynamics");

    for &size in BLOCK_SIZES {
        let input = ramp(size);
        let mut compressor = Compressor::new(-18.0, 3.0, 0.006, 0.25, SAMPLE_RATE);
        let mut limiter = Limiter::new(-6.0, SAMPLE_RATE);
        group.bench_with_input(BenchmarkId::new("compress_limit", size), &size, |b, _| {
            b.iter(|| {
                for x in &input {
                    black_box(limiter.process(compressor.process([*x, -*x])));
                }
            })
        });
    }
    group.finish();
}

pub fn bench_noise(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/noise");

    for &size in BLOCK_SIZES {
        for color in [NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown] {
            let mut noise = NoiseSource::new(color, 0x1234_5678);
            let mut buffer = vec![0.0f32; size];
            let name = format!("{color:?}").to_lowercase();
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    for sample in buffer.iter_mut() {
                        *sample = noise.next_sample(1.0);
                    }
                    black_box(&buffer);
                })
            });
        }
    }
    group.finish();
}
