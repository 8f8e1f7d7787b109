//! Command runners: realtime playback, offline simulation and device info.

use std::thread;
use std::time::{Duration, Instant};

use color_eyre::eyre::{Result as EyreResult, WrapErr};
use tracing::info;

use ambient_drift::render::{list_devices, OutputHost, RenderToolkit};
use ambient_drift::AudioToolkit;
use ambient_drift::{
    ControlAction, ControlPanel, Engine, EngineSettings, LayerKind, LedgerToolkit,
};

use super::ui::UiApp;

/// How often the control loop wakes to fire due cues.
pub const PUMP_INTERVAL: Duration = Duration::from_millis(20);

/// Headless status lines are logged this often.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// One pass of the control loop: surface actions, due cues, freed nodes.
pub fn tick(engine: &mut Engine<RenderToolkit>, panel: &mut ControlPanel) {
    engine.service(panel);
    engine.pump();
    engine.toolkit_mut().collect_garbage();
}

pub fn play(settings: EngineSettings, headless: bool, duration: Option<f64>) -> EyreResult<()> {
    let (host, toolkit) = OutputHost::open().wrap_err("failed to open audio output")?;
    let mut engine = Engine::new(toolkit, settings);

    let result = if headless {
        run_headless(&mut engine, duration)
    } else {
        let mut terminal = ratatui::init();
        let result = UiApp::new(&host).run(&mut terminal, &mut engine);
        ratatui::restore();
        result
    };

    engine.dispose_all();
    // Let the audio thread apply the disposals before the stream goes away.
    thread::sleep(PUMP_INTERVAL * 5);
    engine.toolkit_mut().collect_garbage();
    drop(host);
    result
}

fn run_headless(engine: &mut Engine<RenderToolkit>, duration: Option<f64>) -> EyreResult<()> {
    let mut panel = ControlPanel::new();
    panel.press(ControlAction::Start);

    let started = Instant::now();
    let mut last_status = Instant::now();
    println!("Playing (seed {})... Press Ctrl+C to stop", engine.current_seed());

    loop {
        tick(engine, &mut panel);
        if panel.failures() > 0 && !engine.is_playing() {
            return Err(color_eyre::eyre::eyre!("audio output did not start"));
        }
        if last_status.elapsed() >= STATUS_INTERVAL {
            let snapshot = engine.snapshot();
            info!(
                tempo_bpm = snapshot.tempo_bpm,
                scene = snapshot.scene.unwrap_or("-"),
                density = snapshot.density.unwrap_or(0.0),
                level_db = snapshot.level_db.unwrap_or(f32::NEG_INFINITY),
                "status"
            );
            last_status = Instant::now();
        }
        if duration.is_some_and(|d| started.elapsed().as_secs_f64() >= d) {
            break;
        }
        thread::sleep(PUMP_INTERVAL);
    }
    panel.press(ControlAction::Stop);
    tick(engine, &mut panel);
    Ok(())
}

pub fn simulate(settings: EngineSettings, seconds: f64, step: f64) -> EyreResult<()> {
    let mut toolkit = LedgerToolkit::new();
    toolkit.set_recording(false);
    let mut engine = Engine::new(toolkit, settings);
    engine.play().wrap_err("engine failed to start")?;

    let step = step.max(1e-3);
    let mut tempo_range = (f64::MAX, f64::MIN);
    while engine.toolkit().current_time() < seconds {
        engine.toolkit_mut().advance(step);
        engine.pump();
        let now = engine.toolkit().current_time();
        let bpm = engine.transport().tempo.value_at(now);
        tempo_range = (tempo_range.0.min(bpm), tempo_range.1.max(bpm));
    }

    let snapshot = engine.snapshot();
    let owned = engine.owned_nodes();
    let counts = engine.trigger_counts();
    engine.dispose_all();
    let tk = engine.toolkit();

    println!("=== ambient simulate ===");
    println!("Seed: {}", snapshot.seed);
    println!("Simulated: {:.1} s in {:.3} s steps", snapshot.time, step);
    println!();
    println!("Triggers:");
    for (layer, count) in LayerKind::ALL.iter().zip(counts) {
        let live = if snapshot.layers.contains(layer) { "" } else { " (disabled)" };
        println!("  {:<8} {}{}", layer.name(), count, live);
    }
    if let Some(stats) = snapshot.rhythm {
        println!();
        println!("Static engine:");
        println!("  scene     {}", snapshot.scene.unwrap_or("-"));
        println!("  density   {:.2}", snapshot.density.unwrap_or(0.0));
        println!("  hits      {} ({} sounded)", stats.hits, stats.sounded);
        println!("  sprinkles {}", stats.sprinkles);
        println!("  windows   {} ({} bursts)", stats.windows, stats.window_bursts);
    }
    println!();
    println!("Tempo range: {:.1} - {:.1} BPM", tempo_range.0, tempo_range.1);
    println!(
        "Nodes: {} owned while playing, {} created, {} disposed, {} live",
        owned,
        tk.created_count(),
        tk.disposed_count(),
        tk.live_count()
    );
    Ok(())
}

pub fn info() -> EyreResult<()> {
    println!("ambient {}", env!("CARGO_PKG_VERSION"));
    println!();
    let devices = list_devices().wrap_err("failed to enumerate output devices")?;
    if devices.is_empty() {
        println!("No output devices found");
        return Ok(());
    }
    println!("Output devices:");
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        let config = device.default_config.unwrap_or_else(|| "no default config".to_string());
        println!(" {} {}  [{}]", marker, device.name, config);
    }
    Ok(())
}
