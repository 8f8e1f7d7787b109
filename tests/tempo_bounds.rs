use ambient_drift::config::TempoSettings;
use ambient_drift::transport::{Interval, TempoParam, Transport};
use ambient_drift::{AudioToolkit, Engine, EngineSettings, LedgerToolkit};

fn engine(seed: u32, tempo: TempoSettings) -> Engine<LedgerToolkit> {
    Engine::new(
        LedgerToolkit::new(),
        EngineSettings {
            seed: Some(seed),
            tempo,
            ..EngineSettings::default()
        },
    )
}

fn assert_within(engine: &mut Engine<LedgerToolkit>, seconds: f64, min: f64, max: f64) {
    let until = engine.toolkit().current_time() + seconds;
    while engine.toolkit().current_time() < until {
        engine.toolkit_mut().advance(0.1);
        engine.pump();
        let bpm = engine.snapshot().tempo_bpm;
        assert!(
            bpm >= min - 1e-9 && bpm <= max + 1e-9,
            "{bpm} outside [{min}, {max}] at {}",
            engine.toolkit().current_time()
        );
    }
}

#[test]
fn engine_tempo_stays_in_configured_bounds() {
    let tempo = TempoSettings {
        min_bpm: 64.0,
        max_bpm: 88.0,
        base_bpm: 72.0,
        ramp_secs: [1.0, 4.0],
        hold_secs: [0.5, 2.0],
        ..TempoSettings::default()
    };
    for seed in [1, 2, 3, 99, 4242] {
        let mut engine = engine(seed, tempo);
        engine.play().unwrap();
        assert_within(&mut engine, 120.0, 64.0, 88.0);
    }
}

#[test]
fn stop_and_restart_keep_bounds() {
    let tempo = TempoSettings {
        ramp_secs: [0.5, 2.0],
        hold_secs: [0.0, 1.0],
        ..TempoSettings::default()
    };
    let (min, max) = (tempo.min_bpm, tempo.max_bpm);
    let mut engine = engine(17, tempo);
    for _ in 0..5 {
        engine.play().unwrap();
        assert_within(&mut engine, 15.0, min, max);
        engine.stop();
        assert_within(&mut engine, 5.0, min, max);
    }
    let settle = engine.toolkit().current_time();
    assert_eq!(
        engine.transport().tempo.value_at(settle + 10.0),
        engine.settings().tempo.base_bpm
    );
}

#[test]
fn inverted_bounds_are_repaired_before_use() {
    let tempo = TempoSettings {
        min_bpm: 110.0,
        max_bpm: 70.0,
        base_bpm: 200.0,
        ramp_secs: [3.0, 1.0],
        hold_secs: [1.0, 0.5],
        ..TempoSettings::default()
    };
    let mut engine = engine(5, tempo);
    engine.play().unwrap();
    assert_within(&mut engine, 60.0, 70.0, 110.0);
}

#[test]
fn ramps_requested_outside_bounds_are_clamped() {
    let mut tempo = TempoParam::new(90.0, 60.0, 120.0);
    tempo.ramp_to(400.0, 0.0, 2.0);
    tempo.ramp_to(-5.0, 3.0, 1.0);
    for i in 0..100 {
        let bpm = tempo.value_at(i as f64 * 0.05);
        assert!((60.0..=120.0).contains(&bpm), "{bpm}");
    }
}

#[test]
fn beat_intervals_follow_the_drifting_tempo() {
    let mut transport: Transport<u8> = Transport::new(TempoParam::new(60.0, 60.0, 120.0));
    transport.tempo.ramp_to(120.0, 0.0, 10.0);
    transport.schedule_repeat(Interval::Beats(1.0), 0.0, 0);

    let mut times = Vec::new();
    while let Some(fired) = transport.pop_due(20.0) {
        times.push(fired.time);
    }
    let gaps: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert!((gaps[0] - 1.0).abs() < 1e-9);
    assert!(gaps.windows(2).all(|w| w[1] <= w[0] + 1e-9));
    assert!((gaps[gaps.len() - 1] - 0.5).abs() < 1e-9);
}
