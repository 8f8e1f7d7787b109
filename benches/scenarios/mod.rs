//! Benchmarks for the engine as a whole.
//!
//! `render` warms a full session up for a few seconds so every layer has
//! voices sounding, then times the audio-thread side alone.

use std::hint::black_box;

use ambient_drift::render::{render_pair, Frame};
use ambient_drift::rhythm::{euclid, PatternState};
use ambient_drift::{AudioToolkit, Engine, EngineSettings, LedgerToolkit};
use criterion::{BenchmarkId, Criterion};

use crate::{BLOCK_SIZES, SAMPLE_RATE};

const WARM_UP_SECS: f64 = 3.0;

pub fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/render");

    for &size in BLOCK_SIZES {
        let (mut toolkit, mut graph) = render_pair(SAMPLE_RATE);
        toolkit.set_running(true);
        let settings = EngineSettings {
            seed: Some(7),
            ..EngineSettings::default()
        };
        let mut engine = Engine::new(toolkit, settings);
        if engine.play().is_err() {
            continue;
        }

        let mut block: Vec<Frame> = vec![[0.0; 2]; size];
        let warm_up_blocks = (WARM_UP_SECS * SAMPLE_RATE as f64 / size as f64) as usize;
        for _ in 0..warm_up_blocks {
            engine.pump();
            graph.process(&mut block);
            engine.toolkit_mut().collect_garbage();
        }

        group.bench_with_input(BenchmarkId::new("all_layers", size), &size, |b, _| {
            b.iter(|| {
                engine.pump();
                graph.process(black_box(&mut block));
            })
        });
        engine.dispose_all();
        graph.process(&mut block);
        engine.toolkit_mut().collect_garbage();
    }
    group.finish();
}

pub fn bench_rhythm(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/rhythm");

    for steps in [8usize, 12, 16, 32] {
        group.bench_with_input(BenchmarkId::new("euclid", steps), &steps, |b, &steps| {
            b.iter(|| {
                for fills in 0..=steps {
                    black_box(euclid(black_box(steps), fills, steps / 3));
                }
            })
        });
    }

    group.bench_function("pattern_state", |b| {
        b.iter(|| black_box(PatternState::new(black_box(16), 5, 3)))
    });

    // One simulated minute of scheduling against the recording toolkit.
    group.sample_size(10);
    group.bench_function("simulate_minute", |b| {
        b.iter(|| {
            let mut toolkit = LedgerToolkit::new();
            toolkit.set_recording(false);
            let settings = EngineSettings {
                seed: Some(11),
                ..EngineSettings::default()
            };
            let mut engine = Engine::new(toolkit, settings);
            if engine.play().is_ok() {
                while engine.toolkit().current_time() < 60.0 {
                    engine.toolkit_mut().advance(0.05);
                    engine.pump();
                }
            }
            black_box(engine.trigger_counts())
        })
    });
    group.finish();
}
