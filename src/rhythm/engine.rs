//! The static rhythm engine.
//!
//! Owns a band-pass bank fed from the static voice's tap, a gate and two
//! motion stages. Three lanes step on their own grids; the slower clocks
//! re-derive the lanes' patterns, advance scenes and occasionally open a
//! window of extra bursts.
//!
//! Lifecycle is a two-state machine: `start` moves Idle -> Running and
//! schedules every clock, `stop` cancels them all and closes the gate. A cue
//! that arrives while Idle is ignored.

use tracing::{debug, info, trace};

use super::drift::{RandomWalk, SmoothDrift};
use super::euclid::{pattern_string, PatternState};
use super::scene::{Scene, SCENES};
use super::{Lane, RhythmTuning};
use crate::cue::{Cue, RhythmCue};
use crate::harmony::notes::{shift_cents, shift_octaves};
use crate::harmony::CurrentChords;
use crate::random::Rng;
use crate::toolkit::{
    db_to_gain, AudioToolkit, FilterMode, NodeId, NodeSpec, Param, ToolkitError,
};
use crate::transport::{EventId, Interval, Transport};
use crate::voices::{fade_volume, ChoirVoice, NodeBag, Rig, StaticVoice, VOLUME_FADE_SECS};

pub const BANDS: usize = 4;

const BAND_START_HZ: [f32; BANDS] = [320.0, 760.0, 1_600.0, 3_400.0];
const OCTAVE_CHOICES: [i32; 4] = [-1, 0, 0, 1];
const RETUNE_CENTS: f32 = 12.0;
const FILL_RANGE: (f32, f32) = (0.15, 0.55);
const BEATS_PER_BAR: f64 = 4.0;
const CLOSE_SECS: f64 = 0.05;

struct LaneState {
    lane: Lane,
    pattern: PatternState,
    fills: SmoothDrift,
    rotation: RandomWalk,
    position: usize,
    cue: Option<EventId>,
}

impl LaneState {
    fn new(lane: Lane, rng: &mut Rng) -> Self {
        let steps = lane.base_steps();
        let fills = SmoothDrift::new(rng.range(FILL_RANGE.0, FILL_RANGE.1), 0.35);
        let rotation = RandomWalk::new(0.0, (steps - 1) as f32, 1.0, 0.0);
        let hits = (fills.value() * steps as f32).round() as usize;
        Self {
            lane,
            pattern: PatternState::new(steps, hits.max(1), 0),
            fills,
            rotation,
            position: 0,
            cue: None,
        }
    }

    fn rederive(&mut self, rng: &mut Rng, jitter: usize) {
        let base = self.lane.base_steps() as i32;
        let jitter = jitter as i32;
        let steps = rng.next_int((base - jitter).max(2), base + jitter) as usize;

        self.fills.retarget(rng, FILL_RANGE.0, FILL_RANGE.1);
        let fraction = self.fills.tick();
        let fills = ((fraction * steps as f32).round() as usize).clamp(1, steps);

        self.rotation.set_range(0.0, (steps - 1) as f32);
        let rotation = self.rotation.tick(rng).round() as usize;

        self.pattern = PatternState::new(steps, fills, rotation);
        self.position %= steps;
    }

    /// Report whether the current slot is a hit and move to the next one.
    fn advance(&mut self) -> (bool, usize) {
        let position = self.position;
        let hit = self.pattern.hit(position);
        self.position = (position + 1) % self.pattern.steps.max(1);
        (hit, position)
    }
}

struct Window {
    burst: EventId,
    close: EventId,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RhythmStats {
    /// Pattern hits reached.
    pub hits: u64,
    /// Hits that passed the density check and opened the gate.
    pub sounded: u64,
    pub sprinkles: u64,
    pub windows: u64,
    pub window_bursts: u64,
}

pub struct StaticEngine {
    tuning: RhythmTuning,
    bag: NodeBag,
    bands: Vec<NodeId>,
    gate: NodeId,
    tremolo: NodeId,
    panner: NodeId,
    output: NodeId,
    lanes: Vec<LaneState>,
    density: RandomWalk,
    scene: usize,
    running: bool,
    clocks: Vec<EventId>,
    window: Option<Window>,
    stats: RhythmStats,
}

impl StaticEngine {
    /// Build the gate graph reading from `tap` and feeding `destination`.
    pub fn build(
        toolkit: &mut dyn AudioToolkit,
        rng: &mut Rng,
        tap: NodeId,
        destination: NodeId,
        volume_db: f32,
        tuning: RhythmTuning,
    ) -> Result<Self, ToolkitError> {
        let scene = SCENES[0];
        let tremolo_rate = rng.range(2.0, 6.0);
        let pan_rate = rng.range(0.1, 0.4);

        let (bag, nodes) = NodeBag::assemble(toolkit, |bag, tk| {
            let sum = bag.create(tk, NodeSpec::gain(0.6))?;
            let mut bands = Vec::with_capacity(BANDS);
            for hz in BAND_START_HZ {
                let band = bag.create(tk, NodeSpec::filter(FilterMode::BandPass, hz, scene.q))?;
                tk.connect(tap, band)?;
                tk.connect(band, sum)?;
                bands.push(band);
            }
            let tail = bag.chain(
                tk,
                &[
                    NodeSpec::gain(0.0),
                    NodeSpec::Tremolo {
                        rate_hz: tremolo_rate,
                        depth: scene.tremolo_depth,
                    },
                    NodeSpec::AutoPanner {
                        rate_hz: pan_rate,
                        depth: scene.pan_depth,
                    },
                    NodeSpec::gain(db_to_gain(volume_db)),
                ],
            )?;
            tk.connect(sum, tail[0])?;
            tk.connect(tail[3], destination)?;
            tk.start(tail[1], 0.0)?;
            tk.start(tail[2], 0.0)?;
            Ok((bands, tail))
        })?;
        let (bands, tail) = nodes;

        let lanes = Lane::ALL
            .iter()
            .map(|lane| LaneState::new(*lane, rng))
            .collect();
        let density = RandomWalk::new(
            tuning.density_min,
            tuning.density_max,
            tuning.density_step,
            tuning.density_start,
        );

        Ok(Self {
            tuning,
            bag,
            bands,
            gate: tail[0],
            tremolo: tail[1],
            panner: tail[2],
            output: tail[3],
            lanes,
            density,
            scene: 0,
            running: false,
            clocks: Vec::new(),
            window: None,
            stats: RhythmStats::default(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn scene(&self) -> &'static Scene {
        &SCENES[self.scene % SCENES.len()]
    }

    pub fn density(&self) -> f32 {
        self.density.value()
    }

    pub fn stats(&self) -> RhythmStats {
        self.stats
    }

    pub fn window_open(&self) -> bool {
        self.window.is_some()
    }

    pub fn patterns(&self) -> impl Iterator<Item = (Lane, &PatternState)> {
        self.lanes.iter().map(|l| (l.lane, &l.pattern))
    }

    pub fn node_count(&self) -> usize {
        self.bag.len()
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn set_volume(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        volume_db: f32,
        at: f64,
    ) -> Result<(), ToolkitError> {
        fade_volume(toolkit, self.output, volume_db, at)
    }

    /// Fade the output to silence. `set_volume` brings it back.
    pub fn mute(&mut self, toolkit: &mut dyn AudioToolkit, at: f64) -> Result<(), ToolkitError> {
        toolkit.ramp_param(self.output, Param::Gain, 0.0, at, VOLUME_FADE_SECS)
    }

    /// Idle -> Running: open the voice's tap, derive fresh patterns and
    /// schedule every clock from `at`.
    pub fn start(
        &mut self,
        rig: &mut Rig<'_>,
        voice: &mut StaticVoice,
        at: f64,
    ) -> Result<(), ToolkitError> {
        if self.running {
            return Ok(());
        }
        self.running = true;
        voice.set_tap_level(rig.toolkit, 1.0, at, CLOSE_SECS)?;

        for lane in &mut self.lanes {
            lane.rederive(rig.rng, self.tuning.step_jitter);
            lane.position = 0;
            lane.cue = Some(rig.transport.schedule_repeat(
                Interval::Beats(lane.lane.subdivision()),
                at,
                Cue::Rhythm(RhythmCue::Step(lane.lane)),
            ));
        }

        let clocks = [
            (self.tuning.reroll_bars, RhythmCue::Reroll),
            (self.tuning.scene_bars, RhythmCue::Scene),
            (self.tuning.window_check_bars, RhythmCue::WindowCheck),
        ];
        let spb = rig.transport.tempo.seconds_per_beat(at);
        for (bars, cue) in clocks {
            let beats = bars.max(1) as f64 * BEATS_PER_BAR;
            let id =
                rig.transport
                    .schedule_repeat(Interval::Beats(beats), at + beats * spb, Cue::Rhythm(cue));
            self.clocks.push(id);
        }

        self.apply_scene(rig.toolkit, at, self.tuning.scene_fade_secs)?;
        info!(scene = self.scene().name, density = self.density(), "static engine started");
        self.log_patterns();
        Ok(())
    }

    /// Running -> Idle: cancel every clock and close the gate and the tap.
    pub fn stop(&mut self, rig: &mut Rig<'_>, voice: &mut StaticVoice, at: f64) {
        if !self.running {
            return;
        }
        self.running = false;
        self.cancel_cues(rig.transport);

        let tk = &mut *rig.toolkit;
        if let Err(err) = tk.ramp_param(self.gate, Param::Gain, 0.0, at, CLOSE_SECS) {
            debug!(error = %err, "gate close skipped");
        }
        if let Err(err) = voice.set_tap_level(tk, 0.0, at, CLOSE_SECS) {
            debug!(error = %err, "tap close skipped");
        }
        voice.halt(rig, at);
        info!("static engine stopped");
    }

    fn cancel_cues(&mut self, transport: &mut Transport<Cue>) {
        for lane in &mut self.lanes {
            if let Some(id) = lane.cue.take() {
                transport.cancel(id);
            }
        }
        for id in self.clocks.drain(..) {
            transport.cancel(id);
        }
        if let Some(window) = self.window.take() {
            transport.cancel(window.burst);
            transport.cancel(window.close);
        }
    }

    /// Cancel anything still scheduled and release every owned node. The
    /// voice's tap is not owned here.
    pub fn dispose(&mut self, transport: &mut Transport<Cue>, toolkit: &mut dyn AudioToolkit) {
        self.running = false;
        self.cancel_cues(transport);
        self.bag.release(toolkit);
    }

    /// Route one fired rhythm cue.
    pub fn on_cue(
        &mut self,
        rig: &mut Rig<'_>,
        cue: RhythmCue,
        time: f64,
        voice: &mut StaticVoice,
        choir: Option<&mut ChoirVoice>,
        chords: &CurrentChords,
    ) -> Result<(), ToolkitError> {
        if !self.running {
            return Ok(());
        }
        match cue {
            RhythmCue::Step(lane) => self.step(rig, lane, time, voice, chords),
            RhythmCue::Reroll => {
                self.reroll(rig.rng);
                Ok(())
            }
            RhythmCue::Scene => self.advance_scene(rig, time, choir),
            RhythmCue::WindowCheck => {
                self.maybe_open_window(rig, time);
                Ok(())
            }
            RhythmCue::WindowBurst => self.window_burst(rig, time),
            RhythmCue::WindowClose => {
                if let Some(window) = self.window.take() {
                    rig.transport.cancel(window.burst);
                    debug!("window closed");
                }
                Ok(())
            }
        }
    }

    fn step(
        &mut self,
        rig: &mut Rig<'_>,
        lane: Lane,
        time: f64,
        voice: &mut StaticVoice,
        chords: &CurrentChords,
    ) -> Result<(), ToolkitError> {
        let Some(state) = self.lanes.get_mut(lane.index()) else {
            return Ok(());
        };
        let (hit, position) = state.advance();
        if !hit {
            return Ok(());
        }
        self.stats.hits += 1;

        let factor = self.tuning.tempo_factor(rig.transport.tempo.value_at(time));
        let threshold = (self.density.value() as f64 * factor).min(1.0);
        if rig.rng.next_uniform() >= threshold {
            return Ok(());
        }
        self.stats.sounded += 1;

        self.retune(rig, time, chords)?;
        let velocity = self.scene().accent(position) * lane_weight(lane);
        self.open_gate(rig, time, velocity, factor)?;

        if rig.rng.chance(self.tuning.sprinkle_probability) {
            let duration = rig.rng.next_float(0.04, 0.12);
            let volume_db = rig.rng.range(-18.0, -10.0);
            let rate = rig.rng.range(0.6, 1.8);
            voice.trigger_static(rig, duration, volume_db, time, Some(rate))?;
            self.stats.sprinkles += 1;
        }
        trace!(?lane, position, velocity, "static hit");
        Ok(())
    }

    /// Point each band at a random tone of the current harmony. Leaves the
    /// bank as it is when nothing tonal has played yet.
    fn retune(
        &mut self,
        rig: &mut Rig<'_>,
        time: f64,
        chords: &CurrentChords,
    ) -> Result<(), ToolkitError> {
        let Some(chord) = chords.retune_source() else {
            return Ok(());
        };
        for &band in &self.bands {
            let Some(tone) = rig.rng.pick(chord).copied() else {
                continue;
            };
            let octave = rig.rng.pick(&OCTAVE_CHOICES).copied().unwrap_or(0);
            let cents = rig.rng.range(-RETUNE_CENTS, RETUNE_CENTS);
            let hz = shift_octaves(shift_cents(tone, cents), octave).clamp(40.0, 12_000.0);
            rig.toolkit.set_param(band, Param::Frequency, hz, time)?;
        }
        Ok(())
    }

    /// Attack to `velocity`, then decay to silence. Decay stretches as the
    /// tempo slows.
    fn open_gate(
        &mut self,
        rig: &mut Rig<'_>,
        time: f64,
        velocity: f32,
        tempo_factor: f64,
    ) -> Result<(), ToolkitError> {
        let scene = self.scene();
        let attack = rig.rng.next_float(scene.attack.0 as f64, scene.attack.1 as f64);
        let decay =
            rig.rng.next_float(scene.decay.0 as f64, scene.decay.1 as f64) * tempo_factor;
        let tk = &mut *rig.toolkit;
        tk.ramp_param(self.gate, Param::Gain, velocity.clamp(0.0, 1.0), time, attack)?;
        tk.ramp_param(self.gate, Param::Gain, 0.0, time + attack, decay)
    }

    fn reroll(&mut self, rng: &mut Rng) {
        self.density.tick(rng);
        for lane in &mut self.lanes {
            lane.rederive(rng, self.tuning.step_jitter);
        }
        self.log_patterns();
    }

    fn log_patterns(&self) {
        for lane in &self.lanes {
            debug!(
                lane = ?lane.lane,
                steps = lane.pattern.steps,
                fills = lane.pattern.fills,
                rotation = lane.pattern.rotation,
                pattern = %pattern_string(&lane.pattern.bits),
                density = self.density.value(),
                "rhythm lane"
            );
        }
    }

    fn apply_scene(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        at: f64,
        fade: f64,
    ) -> Result<(), ToolkitError> {
        let scene = self.scene();
        for &band in &self.bands {
            toolkit.ramp_param(band, Param::Q, scene.q, at, fade)?;
        }
        toolkit.ramp_param(self.tremolo, Param::Depth, scene.tremolo_depth, at, fade)?;
        toolkit.ramp_param(self.panner, Param::Depth, scene.pan_depth, at, fade)
    }

    fn advance_scene(
        &mut self,
        rig: &mut Rig<'_>,
        time: f64,
        choir: Option<&mut ChoirVoice>,
    ) -> Result<(), ToolkitError> {
        self.scene = (self.scene + 1) % SCENES.len();
        let fade = self.tuning.scene_fade_secs;
        self.apply_scene(rig.toolkit, time, fade)?;
        let scene = self.scene();
        debug!(scene = scene.name, "scene change");

        if let Some(choir) = choir {
            if rig.rng.chance(self.tuning.scream_toggle_probability) {
                let on = choir.settled_scream().is_none();
                choir.set_scream(rig.toolkit, on, scene.scream_intensity, time, fade)?;
            }
        }
        Ok(())
    }

    fn maybe_open_window(&mut self, rig: &mut Rig<'_>, time: f64) {
        if self.window.is_some() || !rig.rng.chance(self.tuning.window_probability) {
            return;
        }
        let [lo, hi] = self.tuning.window_bars;
        let bars = rig.rng.next_int(lo as i32, hi.max(lo) as i32).max(1);
        let length = bars as f64 * BEATS_PER_BAR * rig.transport.tempo.seconds_per_beat(time);
        let burst = rig.transport.schedule_repeat(
            Interval::Beats(self.tuning.window_subdivision_beats),
            time,
            Cue::Rhythm(RhythmCue::WindowBurst),
        );
        let close = rig
            .transport
            .schedule_once(time + length, Cue::Rhythm(RhythmCue::WindowClose));
        self.window = Some(Window { burst, close });
        self.stats.windows += 1;
        debug!(bars, length_secs = length, "window opened");
    }

    fn window_burst(&mut self, rig: &mut Rig<'_>, time: f64) -> Result<(), ToolkitError> {
        if self.window.is_none() || !rig.rng.chance(self.tuning.window_fire_probability) {
            return Ok(());
        }
        let factor = self.tuning.tempo_factor(rig.transport.tempo.value_at(time));
        let velocity = rig.rng.range(0.3, 0.7);
        self.open_gate(rig, time, velocity, factor)?;
        self.stats.window_bursts += 1;
        Ok(())
    }
}

fn lane_weight(lane: Lane) -> f32 {
    match lane {
        Lane::Sixteenth => 0.75,
        Lane::TripletEighth => 0.85,
        Lane::Quarter => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Routing;
    use crate::toolkit::{LedgerToolkit, NodeKind};
    use crate::transport::TempoParam;

    struct Bench {
        tk: LedgerToolkit,
        rng: Rng,
        transport: Transport<Cue>,
        voice: StaticVoice,
        engine: StaticEngine,
        chords: CurrentChords,
    }

    impl Bench {
        fn new(tuning: RhythmTuning) -> Self {
            let mut tk = LedgerToolkit::new();
            let mut rng = Rng::new(2024);
            let bus = tk.create(NodeSpec::gain(1.0)).unwrap();
            let voice =
                StaticVoice::build(&mut tk, &mut rng, bus, -24.0, Routing::Engine).unwrap();
            let engine =
                StaticEngine::build(&mut tk, &mut rng, voice.tap(), bus, -12.0, tuning).unwrap();
            Self {
                tk,
                rng,
                transport: Transport::new(TempoParam::new(72.0, 60.0, 96.0)),
                voice,
                engine,
                chords: CurrentChords::default(),
            }
        }

        fn start(&mut self) {
            let mut rig = Rig {
                toolkit: &mut self.tk,
                rng: &mut self.rng,
                transport: &mut self.transport,
            };
            self.engine.start(&mut rig, &mut self.voice, 0.0).unwrap();
        }

        fn run(&mut self, until: f64) {
            while let Some(fired) = self.transport.pop_due(until) {
                self.tk.set_time(fired.time);
                let mut rig = Rig {
                    toolkit: &mut self.tk,
                    rng: &mut self.rng,
                    transport: &mut self.transport,
                };
                match fired.cue {
                    Cue::Rhythm(cue) => self
                        .engine
                        .on_cue(&mut rig, cue, fired.time, &mut self.voice, None, &self.chords)
                        .unwrap(),
                    Cue::StaticBurstDone => self.voice.on_burst_done(&mut rig, fired.id).unwrap(),
                    other => panic!("unexpected cue {other:?}"),
                }
            }
        }
    }

    #[test]
    fn running_engine_gates_the_static() {
        let mut bench = Bench::new(RhythmTuning::default());
        bench.start();
        assert!(bench.engine.is_running());
        bench.run(60.0);

        let stats = bench.engine.stats();
        assert!(stats.hits > 0);
        assert!(stats.sounded > 0 && stats.sounded <= stats.hits);
        assert!(!bench.tk.ramps_for(bench.engine.gate, Param::Gain).is_empty());
        for (_, pattern) in bench.engine.patterns() {
            assert!(pattern.hits() >= 1);
        }
    }

    #[test]
    fn hits_retune_bands_to_current_harmony() {
        let mut bench = Bench::new(RhythmTuning {
            density_min: 0.95,
            density_start: 0.95,
            ..RhythmTuning::default()
        });
        let chord = vec![220.0, 277.18, 329.63];
        bench.chords.drone = Some(chord.clone());
        bench.start();
        bench.run(10.0);

        for &band in &bench.engine.bands {
            let hz = bench.tk.param(band, Param::Frequency).unwrap();
            let near = chord.iter().any(|tone| {
                [0.5, 1.0, 2.0].iter().any(|oct| {
                    let cents = 1200.0 * (hz / (tone * oct)).log2();
                    cents.abs() <= RETUNE_CENTS + 0.01
                })
            });
            assert!(near, "band at {hz} Hz is not a chord tone");
        }
    }

    #[test]
    fn stop_cancels_everything_and_ignores_late_cues() {
        let mut bench = Bench::new(RhythmTuning::default());
        bench.start();
        bench.run(20.0);
        {
            let mut rig = Rig {
                toolkit: &mut bench.tk,
                rng: &mut bench.rng,
                transport: &mut bench.transport,
            };
            bench.engine.stop(&mut rig, &mut bench.voice, 20.0);
        }
        assert!(!bench.engine.is_running());
        assert_eq!(bench.transport.pending(), 0);

        let before = bench.engine.stats();
        let mut rig = Rig {
            toolkit: &mut bench.tk,
            rng: &mut bench.rng,
            transport: &mut bench.transport,
        };
        bench
            .engine
            .on_cue(
                &mut rig,
                RhythmCue::Step(Lane::Quarter),
                21.0,
                &mut bench.voice,
                None,
                &bench.chords,
            )
            .unwrap();
        assert_eq!(bench.engine.stats(), before);
    }

    #[test]
    fn windows_open_and_tear_down() {
        let mut bench = Bench::new(RhythmTuning {
            window_probability: 1.0,
            window_fire_probability: 1.0,
            ..RhythmTuning::default()
        });
        bench.start();
        // First window check lands after 8 bars at 72 bpm (26.7 s).
        bench.run(27.0);
        assert!(bench.engine.window_open());
        bench.run(80.0);
        let stats = bench.engine.stats();
        assert!(stats.windows >= 1);
        assert!(stats.window_bursts > 0);
    }

    #[test]
    fn scene_changes_ramp_band_resonance() {
        let mut bench = Bench::new(RhythmTuning::default());
        bench.start();
        bench.run(30.0);
        assert_eq!(bench.engine.scene().name, SCENES[1].name);
        let ramps = bench.tk.ramps_for(bench.engine.bands[0], Param::Q);
        assert_eq!(ramps.len(), 2);
        assert!(ramps.iter().all(|r| r.1 > 0.0));
    }

    #[test]
    fn dispose_releases_only_engine_nodes() {
        let mut bench = Bench::new(RhythmTuning::default());
        let filters_before = bench.tk.nodes_of_kind(NodeKind::Filter).len();
        bench.start();
        bench.engine.dispose(&mut bench.transport, &mut bench.tk);
        bench.engine.dispose(&mut bench.transport, &mut bench.tk);
        assert_eq!(bench.engine.node_count(), 0);
        assert_eq!(bench.transport.pending(), 0);
        assert_eq!(
            bench.tk.nodes_of_kind(NodeKind::Filter).len(),
            filters_before - BANDS
        );
        assert!(bench.tk.node(bench.voice.tap()).is_some());
    }
}
