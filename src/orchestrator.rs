//! The engine context: every layer, subsystem and clock in one owner.
//!
//! ```text
//!   host ──play/stop/resume/dispose_all──> Engine
//!                                           │
//!          advance_to(t) ──> Transport<Cue> ─┤ dispatch
//!                                           v
//!   Harmony ──chords──> SynthHandle ×4 ──> MasterBus ──> output
//!                           ^
//!          StaticEngine ────┘ (gates the static tap)
//! ```
//!
//! Nothing here runs on its own. The host calls `advance_to` (or `pump`)
//! from its control loop and every cue due by then fires in order, so the
//! whole engine lives in one cooperative scheduling domain.

use tracing::{debug, error, info, warn};

use crate::config::{AudioConfig, EngineSettings, LayerKind, Routing};
use crate::control::{ControlAction, ControlSurface, SurfaceState};
use crate::cue::{Cue, RhythmCue};
use crate::error::{EngineError, Result};
use crate::harmony::Harmony;
use crate::master::MasterBus;
use crate::random::{seed_from_clock, Rng};
use crate::rhythm::{RhythmStats, StaticEngine};
use crate::toolkit::{AudioToolkit, ToolkitError};
use crate::transport::tempo::TempoController;
use crate::transport::{EventId, Fired, Interval, TempoParam, Transport};
use crate::voices::{Instrument, Register, Rig, ScreamBurst, SynthHandle, Vowel};

/// Offsets of each layer's first chord after `play`, in `LayerKind::ALL`
/// order.
pub const INITIAL_STAGGER_SECS: [f64; 4] = [0.1, 0.35, 0.6, 0.85];

pub const VOWEL_CHANGE_PROBABILITY: f64 = 0.4;
pub const SCREAM_BURST_PROBABILITY: f64 = 0.1;

/// Loop timing for one layer: seconds between iterations and how long each
/// trigger sounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerTiming {
    pub interval: (f64, f64),
    pub duration: (f64, f64),
}

impl LayerTiming {
    pub const fn of(layer: LayerKind) -> Self {
        match layer {
            LayerKind::Drone => Self {
                interval: (12.0, 20.0),
                duration: (10.0, 16.0),
            },
            LayerKind::Bell => Self {
                interval: (3.0, 8.0),
                duration: (2.0, 4.0),
            },
            LayerKind::Choir => Self {
                interval: (8.0, 14.0),
                duration: (6.0, 10.0),
            },
            LayerKind::Static => Self {
                interval: (1.5, 5.0),
                duration: (0.2, 1.2),
            },
        }
    }
}

fn slot(layer: LayerKind) -> usize {
    match layer {
        LayerKind::Drone => 0,
        LayerKind::Bell => 1,
        LayerKind::Static => 2,
        LayerKind::Choir => 3,
    }
}

/// Read-only view for hosts.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub seed: u32,
    pub time: f64,
    pub tempo_bpm: f64,
    pub playing: bool,
    pub layers: Vec<LayerKind>,
    pub scene: Option<&'static str>,
    pub density: Option<f32>,
    pub rhythm: Option<RhythmStats>,
    /// Last meter reading, dBFS.
    pub level_db: Option<f32>,
}

pub struct Engine<T: AudioToolkit> {
    toolkit: T,
    settings: EngineSettings,
    seed: u32,
    rng: Rng,
    harmony: Harmony,
    transport: Transport<Cue>,
    tempo: TempoController,
    master: Option<MasterBus>,
    layers: [Option<SynthHandle>; 4],
    rhythm: Option<StaticEngine>,
    meter_cue: Option<EventId>,
    playing: bool,
    level_db: Option<f32>,
    triggers: [u64; 4],
}

impl<T: AudioToolkit> Engine<T> {
    /// Seed the generator and shuffle the chord pools. Nothing touches the
    /// toolkit until `play`.
    pub fn new(toolkit: T, settings: EngineSettings) -> Self {
        let seed = settings.seed.unwrap_or_else(seed_from_clock);
        let mut rng = Rng::new(seed);
        let harmony = Harmony::new(&mut rng);
        let tempo_settings = settings.tempo.sanitized();
        let transport = Transport::new(TempoParam::new(
            tempo_settings.base_bpm,
            tempo_settings.min_bpm,
            tempo_settings.max_bpm,
        ));
        info!(seed, "engine created");

        Self {
            toolkit,
            tempo: TempoController::new(tempo_settings),
            settings,
            seed,
            rng,
            harmony,
            transport,
            master: None,
            layers: [None, None, None, None],
            rhythm: None,
            meter_cue: None,
            playing: false,
            level_db: None,
            triggers: [0; 4],
        }
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    pub fn toolkit_mut(&mut self) -> &mut T {
        &mut self.toolkit
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn transport(&self) -> &Transport<Cue> {
        &self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn layer(&self, layer: LayerKind) -> Option<&SynthHandle> {
        self.layers[slot(layer)].as_ref()
    }

    pub fn rhythm(&self) -> Option<&StaticEngine> {
        self.rhythm.as_ref()
    }

    pub fn master(&self) -> Option<&MasterBus> {
        self.master.as_ref()
    }

    /// Triggers issued per layer since creation, in `LayerKind::ALL` order.
    pub fn trigger_counts(&self) -> [u64; 4] {
        self.triggers
    }

    /// Nodes currently owned across the master bus, the layers and the
    /// rhythm engine.
    pub fn owned_nodes(&self) -> usize {
        self.master.as_ref().map_or(0, MasterBus::node_count)
            + self
                .layers
                .iter()
                .flatten()
                .map(|h| h.node_count())
                .sum::<usize>()
            + self.rhythm.as_ref().map_or(0, StaticEngine::node_count)
    }

    pub fn seed_random(&mut self, seed: Option<u32>) -> u32 {
        let seed = seed.unwrap_or_else(seed_from_clock);
        self.rng.seed(seed);
        self.harmony.reshuffle(&mut self.rng);
        self.seed = seed;
        info!(seed, "reseeded");
        seed
    }

    pub fn current_seed(&self) -> u32 {
        self.seed
    }

    pub fn audio_config(&self) -> AudioConfig {
        self.settings.layers
    }

    /// Change a layer's switch or level. Returns false for an unknown layer.
    ///
    /// A new level fades in on a live voice right away. Disabling a live
    /// layer mutes its loop without disposing it; enabling a layer that was
    /// never built takes effect on the next `play` from a stopped state.
    pub fn update_audio_config(
        &mut self,
        layer: &str,
        enabled: Option<bool>,
        volume_db: Option<f32>,
    ) -> bool {
        let kind = match layer.parse::<LayerKind>() {
            Ok(kind) => kind,
            Err(err) => {
                error!(error = %err, "audio config update rejected");
                return false;
            }
        };

        let now = self.toolkit.current_time();
        let config = self.settings.layers.get_mut(kind);
        let was_enabled = config.enabled;
        if let Some(enabled) = enabled {
            config.enabled = enabled;
        }
        let volume_db = volume_db.filter(|db| db.is_finite());
        if let Some(db) = volume_db {
            config.volume_db = db;
            if let Some(handle) = self.layers[slot(kind)].as_mut() {
                if let Err(err) = handle.set_volume(&mut self.toolkit, db, now) {
                    warn!(layer = %kind, error = %err, "volume change failed");
                }
            }
        }
        let is_enabled = self.settings.layers.get(kind).enabled;

        if !is_enabled {
            self.harmony.forget(kind);
        }
        if kind == LayerKind::Static {
            match (was_enabled, is_enabled) {
                (true, false) => self.silence_static(now),
                (false, true) if self.playing => self.start_rhythm(now),
                _ => {
                    let rhythm = self.rhythm.as_mut().filter(|_| is_enabled);
                    if let (Some(db), Some(rhythm)) = (volume_db, rhythm) {
                        if let Err(err) = rhythm.set_volume(&mut self.toolkit, db, now) {
                            warn!(error = %err, "rhythm volume change failed");
                        }
                    }
                }
            }
        }
        info!(layer = %kind, ?enabled, ?volume_db, "audio config updated");
        true
    }

    /// Stop the rhythm engine, drop queued bursts and fade the gate output.
    /// The nodes stay in place for a later re-enable.
    fn silence_static(&mut self, now: f64) {
        let [_, _, static_slot, _] = &mut self.layers;
        let Some(voice) = static_slot.as_mut().and_then(SynthHandle::as_static_mut) else {
            return;
        };
        let mut rig = Rig {
            toolkit: &mut self.toolkit,
            rng: &mut self.rng,
            transport: &mut self.transport,
        };
        match self.rhythm.as_mut() {
            Some(rhythm) => {
                rhythm.stop(&mut rig, voice, now);
                if let Err(err) = rhythm.mute(rig.toolkit, now) {
                    debug!(error = %err, "rhythm mute skipped");
                }
            }
            None => voice.halt(&mut rig, now),
        }
        debug!("static layer silenced");
    }

    /// Bring the rhythm engine up at its configured level, if there is one
    /// and the static layer is enabled.
    fn start_rhythm(&mut self, now: f64) {
        if !self.settings.layers.static_noise.enabled {
            return;
        }
        let volume_db = self.settings.layers.static_noise.volume_db;
        let [_, _, static_slot, _] = &mut self.layers;
        let (Some(rhythm), Some(voice)) = (
            self.rhythm.as_mut(),
            static_slot.as_mut().and_then(SynthHandle::as_static_mut),
        ) else {
            return;
        };
        let mut rig = Rig {
            toolkit: &mut self.toolkit,
            rng: &mut self.rng,
            transport: &mut self.transport,
        };
        if let Err(err) = rhythm.set_volume(rig.toolkit, volume_db, now) {
            warn!(error = %err, "rhythm volume restore failed");
        }
        if let Err(err) = rhythm.start(&mut rig, voice, now) {
            warn!(error = %err, "static engine failed to start");
        }
    }

    /// Start playback. Builds the master bus and any enabled layer that has
    /// no voice yet; existing voices are reused. Calling it while already
    /// playing does nothing.
    pub fn play(&mut self) -> Result<()> {
        if !self.toolkit.is_running() {
            warn!("audio output is not running; play deferred");
            return Err(EngineError::OutputUnavailable);
        }
        if self.playing {
            debug!("already playing");
            return Ok(());
        }
        self.ensure_built()?;

        let now = self.toolkit.current_time();
        for layer in LayerKind::ALL {
            if self.layers[slot(layer)].is_some() {
                let at = now + INITIAL_STAGGER_SECS[slot(layer)];
                self.transport.schedule_once(at, Cue::InitialChord(layer));
            }
        }

        self.start_rhythm(now);
        self.tempo.start(&mut self.transport, now, Cue::TempoCycle);
        if self.meter_cue.is_none() {
            let interval = self.settings.meter.interval_secs.max(0.05);
            self.meter_cue = Some(self.transport.schedule_repeat(
                Interval::Seconds(interval),
                now + interval,
                Cue::MeterCheck,
            ));
        }
        if !self.transport.is_running() {
            self.transport.start();
        }
        self.playing = true;
        info!(seed = self.seed, layers = self.live_layers().len(), "playing");
        Ok(())
    }

    fn ensure_built(&mut self) -> Result<()> {
        if self.master.is_none() {
            self.master = Some(MasterBus::build(&mut self.toolkit)?);
        }
        let Some(destination) = self.master.as_ref().map(MasterBus::input) else {
            return Ok(());
        };

        let routing = self.settings.static_routing;
        let enabled: Vec<LayerKind> = self.settings.layers.enabled_layers().collect();
        for layer in enabled {
            if self.layers[slot(layer)].is_some() {
                continue;
            }
            let volume_db = self.settings.layers.get(layer).volume_db;
            match SynthHandle::build(
                layer,
                &mut self.toolkit,
                &mut self.rng,
                destination,
                volume_db,
                routing,
            ) {
                Ok(handle) => {
                    debug!(layer = %layer, nodes = handle.node_count(), "layer built");
                    self.layers[slot(layer)] = Some(handle);
                }
                Err(err) => warn!(layer = %layer, error = %err, "layer failed to build; it stays silent"),
            }
        }

        if self.rhythm.is_none() && routing == Routing::Engine {
            let tap = self.layers[slot(LayerKind::Static)]
                .as_ref()
                .and_then(SynthHandle::as_static)
                .map(|voice| voice.tap());
            if let Some(tap) = tap {
                let volume_db = self.settings.layers.static_noise.volume_db;
                match StaticEngine::build(
                    &mut self.toolkit,
                    &mut self.rng,
                    tap,
                    destination,
                    volume_db,
                    self.settings.rhythm.clone(),
                ) {
                    Ok(rhythm) => self.rhythm = Some(rhythm),
                    Err(err) => warn!(error = %err, "static engine failed to build"),
                }
            }
        }
        Ok(())
    }

    /// Halt loops, the rhythm engine and the tempo drift. Every node stays
    /// in place so `play` can pick up again.
    pub fn stop(&mut self) {
        let now = self.toolkit.current_time();
        {
            let [_, _, static_slot, _] = &mut self.layers;
            let mut rig = Rig {
                toolkit: &mut self.toolkit,
                rng: &mut self.rng,
                transport: &mut self.transport,
            };
            if let Some(voice) = static_slot.as_mut().and_then(SynthHandle::as_static_mut) {
                if let Some(rhythm) = self.rhythm.as_mut() {
                    rhythm.stop(&mut rig, voice, now);
                }
                voice.halt(&mut rig, now);
            }
        }
        for handle in self.layers.iter_mut().flatten() {
            handle.silence(&mut self.toolkit, now);
        }

        self.tempo.stop(&mut self.transport, now);
        let cancelled = self.transport.cancel_where(Cue::is_musical);
        self.transport.stop();
        if self.playing {
            info!(cancelled, "stopped");
        }
        self.playing = false;
    }

    /// Re-enter `play` when audio has started before but is paused now.
    /// Returns whether `play` ran.
    pub fn resume(&mut self, state: SurfaceState) -> Result<bool> {
        if state.audio_started && !state.is_playing {
            self.play()?;
            return Ok(true);
        }
        debug!(?state, "resume ignored");
        Ok(false)
    }

    /// Stop, then release every node the engine owns. Safe to call at any
    /// time and any number of times.
    pub fn dispose_all(&mut self) {
        self.stop();
        if let Some(mut rhythm) = self.rhythm.take() {
            rhythm.dispose(&mut self.transport, &mut self.toolkit);
        }
        for slot in &mut self.layers {
            if let Some(mut handle) = slot.take() {
                handle.dispose(&mut self.toolkit);
            }
        }
        if let Some(mut master) = self.master.take() {
            master.dispose(&mut self.toolkit);
        }
        if let Some(id) = self.meter_cue.take() {
            self.transport.cancel(id);
        }
        self.transport.cancel_all();
        self.harmony.current.clear();
        self.level_db = None;
        info!("disposed");
    }

    /// Drain the control surface's queued actions and report each outcome.
    pub fn service(&mut self, surface: &mut impl ControlSurface) {
        while let Some(action) = surface.poll_action() {
            let ok = match action {
                ControlAction::Start => self.play().is_ok(),
                ControlAction::Stop => {
                    self.stop();
                    true
                }
                ControlAction::Resume => match self.resume(surface.state()) {
                    Ok(resumed) => resumed || self.playing,
                    Err(err) => {
                        debug!(error = %err, "resume failed");
                        false
                    }
                },
            };
            surface.on_handled(action, ok);
        }
    }

    /// Fire every cue due at or before `time`.
    pub fn advance_to(&mut self, time: f64) {
        while let Some(fired) = self.transport.pop_due(time) {
            self.dispatch(fired);
        }
    }

    /// Fire everything due within the lookahead of the toolkit clock.
    pub fn pump(&mut self) {
        let until = self.toolkit.current_time() + self.settings.lookahead_secs;
        self.advance_to(until);
    }

    fn dispatch(&mut self, fired: Fired<Cue>) {
        let time = fired.time;
        match fired.cue {
            Cue::InitialChord(layer) => {
                self.trigger_layer(layer, time);
                self.schedule_loop(layer, time);
            }
            Cue::LayerLoop(layer) => {
                self.trigger_layer(layer, time);
                self.schedule_loop(layer, time);
            }
            Cue::TempoCycle => {
                self.tempo
                    .on_cycle(&mut self.transport, &mut self.rng, time, Cue::TempoCycle);
            }
            Cue::StaticBurstDone => {
                let [_, _, static_slot, _] = &mut self.layers;
                if let Some(voice) = static_slot.as_mut().and_then(SynthHandle::as_static_mut) {
                    let mut rig = Rig {
                        toolkit: &mut self.toolkit,
                        rng: &mut self.rng,
                        transport: &mut self.transport,
                    };
                    if let Err(err) = voice.on_burst_done(&mut rig, fired.id) {
                        warn!(error = %err, "queued static burst failed");
                    }
                }
            }
            Cue::ChoirBurstRestore => {
                let [_, _, _, choir_slot] = &mut self.layers;
                if let Some(choir) = choir_slot.as_mut().and_then(SynthHandle::as_choir_mut) {
                    if let Err(err) = choir.restore_after_burst(&mut self.toolkit, time) {
                        warn!(error = %err, "choir restore failed");
                    }
                }
            }
            Cue::MeterCheck => {
                if let Some(master) = self.master.as_ref() {
                    self.level_db = master
                        .check_level(&self.toolkit, self.settings.meter.warn_db)
                        .or(self.level_db);
                }
            }
            Cue::Rhythm(cue) => self.route_rhythm(cue, time),
        }
    }

    fn route_rhythm(&mut self, cue: RhythmCue, time: f64) {
        let Some(rhythm) = self.rhythm.as_mut() else {
            return;
        };
        let [_, _, static_slot, choir_slot] = &mut self.layers;
        let Some(voice) = static_slot.as_mut().and_then(SynthHandle::as_static_mut) else {
            return;
        };
        let choir = choir_slot.as_mut().and_then(SynthHandle::as_choir_mut);
        let mut rig = Rig {
            toolkit: &mut self.toolkit,
            rng: &mut self.rng,
            transport: &mut self.transport,
        };
        if let Err(err) = rhythm.on_cue(&mut rig, cue, time, voice, choir, &self.harmony.current) {
            warn!(?cue, error = %err, "rhythm step failed");
        }
    }

    fn schedule_loop(&mut self, layer: LayerKind, time: f64) {
        if self.layers[slot(layer)].is_none() {
            return;
        }
        let timing = LayerTiming::of(layer);
        let wait = self.rng.next_float(timing.interval.0, timing.interval.1);
        self.transport
            .schedule_once(time + wait, Cue::LayerLoop(layer));
    }

    /// One iteration of a layer loop. Failures are logged and the loop
    /// carries on.
    fn trigger_layer(&mut self, layer: LayerKind, time: f64) {
        if !self.settings.layers.get(layer).enabled {
            return;
        }
        let timing = LayerTiming::of(layer);
        let duration = self.rng.next_float(timing.duration.0, timing.duration.1);

        let result = match layer {
            LayerKind::Static => self.trigger_static(duration, time),
            LayerKind::Choir => self.trigger_choir(duration, time),
            LayerKind::Drone | LayerKind::Bell => self.trigger_chord(layer, duration, time),
        };
        match result {
            Ok(true) => {
                self.triggers[slot(layer)] += 1;
                debug!(layer = %layer, time, duration, "layer triggered");
            }
            Ok(false) => {}
            Err(err) => warn!(layer = %layer, time, error = %err, "trigger failed"),
        }
    }

    fn trigger_chord(
        &mut self,
        layer: LayerKind,
        duration: f64,
        time: f64,
    ) -> std::result::Result<bool, ToolkitError> {
        let Some(handle) = self.layers[slot(layer)].as_mut() else {
            return Ok(false);
        };
        let Some(chord) = self.harmony.next_chord(layer, &mut self.rng) else {
            return Ok(false);
        };
        handle.trigger_notes(&mut self.toolkit, &chord, duration, time)?;
        Ok(true)
    }

    /// Free routing only: the rhythm engine drives the voice otherwise.
    fn trigger_static(&mut self, duration: f64, time: f64) -> std::result::Result<bool, ToolkitError> {
        let [_, _, static_slot, _] = &mut self.layers;
        let Some(voice) = static_slot.as_mut().and_then(SynthHandle::as_static_mut) else {
            return Ok(false);
        };
        if voice.routing() != Routing::Free {
            return Ok(false);
        }
        let mut rig = Rig {
            toolkit: &mut self.toolkit,
            rng: &mut self.rng,
            transport: &mut self.transport,
        };
        let volume_db = rig.rng.range(-12.0, -4.0);
        let rate = rig.rng.chance(0.3).then(|| rig.rng.range(0.5, 1.5));
        voice.trigger_static(&mut rig, duration, volume_db, time, rate)?;
        Ok(true)
    }

    fn trigger_choir(&mut self, duration: f64, time: f64) -> std::result::Result<bool, ToolkitError> {
        let Some(chord) = self.harmony.next_chord(LayerKind::Choir, &mut self.rng) else {
            return Ok(false);
        };
        let [_, _, _, choir_slot] = &mut self.layers;
        let Some(choir) = choir_slot.as_mut().and_then(SynthHandle::as_choir_mut) else {
            return Ok(false);
        };
        let mut rig = Rig {
            toolkit: &mut self.toolkit,
            rng: &mut self.rng,
            transport: &mut self.transport,
        };

        if rig.rng.chance(VOWEL_CHANGE_PROBABILITY) {
            let vowel = rig.rng.pick(&Vowel::ALL).copied().unwrap_or(Vowel::A);
            let register = rig.rng.pick(&Register::ALL).copied().unwrap_or(Register::Alto);
            let glide = rig.rng.next_float(1.5, 4.0);
            choir.set_vowel(rig.toolkit, vowel, register, time, glide)?;
        }

        if rig.rng.chance(SCREAM_BURST_PROBABILITY) {
            let note = chord.iter().copied().fold(0.0f32, f32::max);
            let options = ScreamBurst {
                up: rig.rng.chance(0.5),
                intensity: rig.rng.range(0.4, 0.9),
            };
            let burst = rig.rng.next_float(1.0, 2.5);
            choir.scream_burst(&mut rig, note, burst, options, time)?;
        } else {
            choir.trigger_notes(rig.toolkit, &chord, duration, time)?;
        }
        Ok(true)
    }

    /// Layers that currently hold a voice.
    pub fn live_layers(&self) -> Vec<LayerKind> {
        LayerKind::ALL
            .into_iter()
            .filter(|layer| self.layers[slot(*layer)].is_some())
            .collect()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let time = self.toolkit.current_time();
        EngineSnapshot {
            seed: self.seed,
            time,
            tempo_bpm: self.transport.tempo.value_at(time),
            playing: self.playing,
            layers: self.live_layers(),
            scene: self.rhythm.as_ref().map(|r| r.scene().name),
            density: self.rhythm.as_ref().map(StaticEngine::density),
            rhythm: self.rhythm.as_ref().map(StaticEngine::stats),
            level_db: self.level_db,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlPanel;
    use crate::toolkit::LedgerToolkit;

    fn settings(seed: u32) -> EngineSettings {
        EngineSettings {
            seed: Some(seed),
            ..EngineSettings::default()
        }
    }

    fn engine(seed: u32) -> Engine<LedgerToolkit> {
        Engine::new(LedgerToolkit::new(), settings(seed))
    }

    fn run(engine: &mut Engine<LedgerToolkit>, until: f64, step: f64) {
        while engine.toolkit().current_time() < until {
            engine.toolkit_mut().advance(step);
            engine.pump();
        }
    }

    #[test]
    fn suspended_output_builds_nothing() {
        let mut engine = Engine::new(LedgerToolkit::suspended(), settings(1));
        let err = engine.play().unwrap_err();
        assert!(matches!(err, EngineError::OutputUnavailable));
        assert_eq!(engine.toolkit().created_count(), 0);
        assert!(!engine.is_playing());
    }

    #[test]
    fn initial_chords_are_staggered() {
        let mut engine = engine(5);
        engine.play().unwrap();

        let mut firsts = Vec::new();
        while let Some(fired) = engine.transport.pop_due(1.0) {
            if let Cue::InitialChord(layer) = fired.cue {
                firsts.push((layer, fired.time));
            }
        }
        assert_eq!(firsts.len(), 4);
        for (layer, time) in firsts {
            assert_eq!(time, INITIAL_STAGGER_SECS[slot(layer)]);
        }
    }

    #[test]
    fn second_play_reuses_layers() {
        let mut engine = engine(9);
        engine.play().unwrap();
        let created = engine.toolkit().created_count();
        let pending = engine.transport().pending();
        engine.play().unwrap();
        assert_eq!(engine.toolkit().created_count(), created);
        assert_eq!(engine.transport().pending(), pending);
    }

    #[test]
    fn loops_keep_triggering_every_layer() {
        let mut engine = engine(21);
        engine.update_audio_config("static", None, Some(-20.0));
        engine.play().unwrap();
        run(&mut engine, 40.0, 0.05);

        let counts = engine.trigger_counts();
        assert!(counts[slot(LayerKind::Drone)] >= 2);
        assert!(counts[slot(LayerKind::Bell)] >= 4);
        assert!(counts[slot(LayerKind::Choir)] >= 2);
        // Engine routing: the rhythm engine, not the loop, plays static.
        assert_eq!(counts[slot(LayerKind::Static)], 0);
        assert!(engine.rhythm().is_some_and(|r| r.stats().hits > 0));
    }

    #[test]
    fn free_routing_uses_loop_bursts_and_no_rhythm_engine() {
        let mut s = settings(4);
        s.static_routing = Routing::Free;
        let mut engine = Engine::new(LedgerToolkit::new(), s);
        engine.play().unwrap();
        assert!(engine.rhythm().is_none());
        run(&mut engine, 20.0, 0.05);
        assert!(engine.trigger_counts()[slot(LayerKind::Static)] >= 2);
    }

    #[test]
    fn unknown_layer_is_rejected() {
        let mut engine = engine(3);
        assert!(!engine.update_audio_config("harp", Some(true), None));
        assert!(engine.update_audio_config("Bell", Some(false), Some(-9.0)));
        let config = engine.audio_config();
        assert!(!config.bell.enabled);
        assert_eq!(config.bell.volume_db, -9.0);
    }

    #[test]
    fn disabled_layers_are_never_built() {
        let mut engine = engine(8);
        engine.update_audio_config("choir", Some(false), None);
        engine.update_audio_config("static", Some(false), None);
        engine.play().unwrap();
        assert_eq!(engine.live_layers(), vec![LayerKind::Drone, LayerKind::Bell]);
        assert!(engine.rhythm().is_none());
    }

    #[test]
    fn failed_triggers_do_not_stop_other_cues() {
        let mut engine = engine(12);
        engine.play().unwrap();
        engine.toolkit_mut().reject_triggers(true);
        run(&mut engine, 5.0, 0.1);
        engine.toolkit_mut().reject_triggers(false);
        run(&mut engine, 60.0, 0.1);
        assert!(engine.trigger_counts()[slot(LayerKind::Bell)] > 0);
    }

    #[test]
    fn meter_readings_reach_the_snapshot() {
        let mut engine = engine(2);
        engine.play().unwrap();
        let meter = engine.master().map(MasterBus::meter).unwrap();
        engine.toolkit_mut().set_level(meter, -1.5);
        run(&mut engine, 2.0, 0.1);
        assert_eq!(engine.snapshot().level_db, Some(-1.5));
    }

    #[test]
    fn service_reports_outcomes_to_the_surface() {
        let mut engine = Engine::new(LedgerToolkit::suspended(), settings(6));
        let mut panel = ControlPanel::new();

        panel.press(ControlAction::Start);
        engine.service(&mut panel);
        assert_eq!(panel.failures(), 1);
        assert!(!panel.state().audio_started);

        engine.toolkit_mut().set_running(true);
        panel.press(ControlAction::Start);
        panel.press(ControlAction::Stop);
        panel.press(ControlAction::Resume);
        engine.service(&mut panel);
        assert_eq!(panel.failures(), 1);
        assert!(panel.state().is_playing);
        assert!(engine.is_playing());
    }

    #[test]
    fn reseeding_returns_the_active_seed() {
        let mut engine = engine(77);
        assert_eq!(engine.current_seed(), 77);
        assert_eq!(engine.seed_random(Some(1234)), 1234);
        assert_eq!(engine.current_seed(), 1234);
        let derived = engine.seed_random(None);
        assert_eq!(engine.current_seed(), derived);
    }

    #[test]
    fn reseeding_before_play_matches_a_fresh_engine() {
        let mut reseeded = engine(5);
        reseeded.seed_random(Some(9));
        let mut fresh = engine(9);
        for engine in [&mut reseeded, &mut fresh] {
            engine.play().unwrap();
            run(engine, 40.0, 0.05);
        }
        assert_eq!(reseeded.trigger_counts(), fresh.trigger_counts());
        assert_eq!(reseeded.harmony.current, fresh.harmony.current);
        assert_eq!(reseeded.snapshot().rhythm, fresh.snapshot().rhythm);
    }

    #[test]
    fn disabled_layer_stops_steering_the_static_bands() {
        let mut engine = engine(31);
        engine.play().unwrap();
        run(&mut engine, 20.0, 0.05);
        assert!(engine.harmony.current.choir.is_some());

        engine.update_audio_config("choir", Some(false), None);
        assert!(engine.harmony.current.choir.is_none());
        run(&mut engine, 30.0, 0.05);
        assert!(engine.harmony.current.choir.is_none());
        assert_eq!(
            engine.harmony.current.retune_source(),
            engine.harmony.current.drone.as_deref()
        );
    }
}
