//! Static: a permanently running noise source, coloured and roughened, whose
//! level is only ever moved by gain ramps.
//!
//! ```text
//! Noise -> tap -> HighPass ~ -> HighPass ~ -> LowPass ~ -> BitCrusher -> WaveShaper -> burst gain
//!           │                                                                           │
//!           └──> (engine routing: rhythm gate reads here)                               v
//!                                            free:   Reverb -> Panner -> Volume -> bus
//!                                            engine: Volume -> bus
//! ```
//!
//! `~` marks filters with an LFO on their cutoff.
//!
//! Bursts are serialized: while one is sounding, new requests wait in a FIFO
//! and are replayed when the current one ends, each starting no earlier than
//! the previous one's end.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::{fade_volume, wet, Instrument, NodeBag, Rig, MIN_PERCUSSIVE_ATTACK};
use crate::config::{LayerKind, Routing};
use crate::cue::Cue;
use crate::random::Rng;
use crate::toolkit::{
    db_to_gain, AudioToolkit, FilterMode, NodeId, NodeSpec, NoiseColor, Param, ToolkitError,
};
use crate::transport::EventId;

/// Shortest burst; anything shorter is stretched to fit attack and release.
pub const MIN_BURST_SECS: f64 = 0.05;

/// How many finished or scheduled bursts are remembered for inspection.
pub const BURST_HISTORY: usize = 32;

const BURST_RELEASE_SECS: f64 = 0.03;

/// Playback-rate crossfade applied at the edges of a rate-shifted burst.
const RATE_FADE_SECS: f64 = 0.02;

/// One scheduled burst, as it was actually placed on the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstRecord {
    pub start: f64,
    pub end: f64,
    pub volume_db: f32,
}

#[derive(Debug, Clone, Copy)]
struct BurstRequest {
    duration: f64,
    volume_db: f32,
    start: f64,
    rate: Option<f32>,
}

pub struct StaticVoice {
    bag: NodeBag,
    noise: NodeId,
    tap: NodeId,
    burst_gain: NodeId,
    volume: NodeId,
    routing: Routing,
    color: NoiseColor,
    active: Option<EventId>,
    last_end: f64,
    queue: VecDeque<BurstRequest>,
    recent: VecDeque<BurstRecord>,
}

impl StaticVoice {
    pub fn build(
        toolkit: &mut dyn AudioToolkit,
        rng: &mut Rng,
        destination: NodeId,
        volume_db: f32,
        routing: Routing,
    ) -> Result<Self, ToolkitError> {
        let color = *rng
            .pick(&[NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown])
            .unwrap_or(&NoiseColor::White);
        let high_a = rng.range(80.0, 200.0);
        let high_b = rng.range(300.0, 600.0);
        let low = rng.range(3_000.0, 7_000.0);
        let crusher = NodeSpec::BitCrusher {
            bits: rng.range(4.0, 8.0).round(),
            wet: wet(rng, 0.2, 0.5),
        };
        let shaper = NodeSpec::WaveShaper {
            drive: rng.range(1.5, 4.0),
            wet: wet(rng, 0.2, 0.6),
        };
        let reverb = NodeSpec::Reverb {
            decay_secs: rng.range(2.0, 5.0),
            wet: wet(rng, 0.2, 0.5),
        };
        let pan = rng.range(-0.3, 0.3);
        let sweeps = [
            (rng.range(0.05, 0.15), high_a * 0.4),
            (rng.range(0.05, 0.15), high_b * 0.4),
            (rng.range(0.02, 0.08), low * 0.3),
        ];

        let (bag, ids) = NodeBag::assemble(toolkit, |bag, tk| {
            let chain = bag.chain(
                tk,
                &[
                    NodeSpec::Noise { color },
                    NodeSpec::gain(1.0),
                    NodeSpec::filter(FilterMode::HighPass, high_a, 0.7),
                    NodeSpec::filter(FilterMode::HighPass, high_b, 0.5),
                    NodeSpec::filter(FilterMode::LowPass, low, 0.7),
                    crusher,
                    shaper,
                    NodeSpec::gain(0.0),
                ],
            )?;
            for (filter, (rate, depth)) in chain[2..5].iter().zip(sweeps) {
                let lfo = bag.create(tk, NodeSpec::lfo(rate, -depth, depth))?;
                tk.modulate(lfo, *filter, Param::Frequency)?;
                tk.start(lfo, 0.0)?;
            }

            let burst_gain = chain[7];
            let volume = match routing {
                Routing::Free => {
                    let out = bag.chain(
                        tk,
                        &[
                            reverb,
                            NodeSpec::Panner { pan },
                            NodeSpec::gain(db_to_gain(volume_db)),
                        ],
                    )?;
                    tk.connect(burst_gain, out[0])?;
                    out[2]
                }
                Routing::Engine => {
                    let volume = bag.create(tk, NodeSpec::gain(db_to_gain(volume_db)))?;
                    tk.connect(burst_gain, volume)?;
                    volume
                }
            };
            tk.connect(volume, destination)?;
            tk.start(chain[0], 0.0)?;
            Ok((chain[0], chain[1], burst_gain, volume))
        })?;
        let (noise, tap, burst_gain, volume) = ids;

        debug!(?color, ?routing, "static voice built");
        Ok(Self {
            bag,
            noise,
            tap,
            burst_gain,
            volume,
            routing,
            color,
            active: None,
            last_end: 0.0,
            queue: VecDeque::new(),
            recent: VecDeque::with_capacity(BURST_HISTORY),
        })
    }

    pub fn routing(&self) -> Routing {
        self.routing
    }

    pub fn color(&self) -> NoiseColor {
        self.color
    }

    /// The pre-effects tap an external gate reads from.
    pub fn tap(&self) -> NodeId {
        self.tap
    }

    pub fn is_bursting(&self) -> bool {
        self.active.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Most recent bursts, oldest first.
    pub fn recent_bursts(&self) -> impl Iterator<Item = &BurstRecord> {
        self.recent.iter()
    }

    /// Schedule a burst of `duration` seconds at `volume_db`, starting at
    /// `start`. With `rate`, the noise playback rate crossfades to it for the
    /// burst and back afterwards. Queued if another burst is sounding.
    pub fn trigger_static(
        &mut self,
        rig: &mut Rig<'_>,
        duration: f64,
        volume_db: f32,
        start: f64,
        rate: Option<f32>,
    ) -> Result<(), ToolkitError> {
        let request = BurstRequest {
            duration: duration.max(MIN_BURST_SECS),
            volume_db,
            start,
            rate,
        };
        if self.active.is_some() {
            self.queue.push_back(request);
            trace!(queued = self.queue.len(), "static burst queued");
            return Ok(());
        }
        self.play(rig, request)
    }

    fn play(&mut self, rig: &mut Rig<'_>, request: BurstRequest) -> Result<(), ToolkitError> {
        let start = request.start.max(self.last_end);
        let end = start + request.duration;
        let attack = MIN_PERCUSSIVE_ATTACK as f64;
        let tk = &mut *rig.toolkit;

        tk.ramp_param(
            self.burst_gain,
            Param::Gain,
            db_to_gain(request.volume_db),
            start,
            attack,
        )?;
        tk.ramp_param(
            self.burst_gain,
            Param::Gain,
            0.0,
            end - BURST_RELEASE_SECS,
            BURST_RELEASE_SECS,
        )?;
        if let Some(rate) = request.rate {
            tk.ramp_param(self.noise, Param::PlaybackRate, rate, start, RATE_FADE_SECS)?;
            tk.ramp_param(
                self.noise,
                Param::PlaybackRate,
                1.0,
                end - RATE_FADE_SECS,
                RATE_FADE_SECS,
            )?;
        }

        self.active = Some(rig.transport.schedule_once(end, Cue::StaticBurstDone));
        self.last_end = end;
        if self.recent.len() == BURST_HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(BurstRecord {
            start,
            end,
            volume_db: request.volume_db,
        });
        trace!(start, end, volume_db = request.volume_db, "static burst");
        Ok(())
    }

    /// The burst identified by `id` has ended: start the next queued one.
    /// Stale ids are ignored.
    pub fn on_burst_done(&mut self, rig: &mut Rig<'_>, id: EventId) -> Result<(), ToolkitError> {
        if self.active != Some(id) {
            return Ok(());
        }
        self.active = None;
        match self.queue.pop_front() {
            Some(next) => self.play(rig, next),
            None => Ok(()),
        }
    }

    /// Drop every queued burst and fade the current one out.
    pub fn halt(&mut self, rig: &mut Rig<'_>, at: f64) {
        self.queue.clear();
        if let Some(id) = self.active.take() {
            rig.transport.cancel(id);
        }
        self.last_end = self.last_end.min(at);
        let tk = &mut *rig.toolkit;
        let fades = [
            (self.burst_gain, Param::Gain, 0.0),
            (self.noise, Param::PlaybackRate, 1.0),
        ];
        for (node, param, target) in fades {
            if let Err(err) = tk.ramp_param(node, param, target, at, BURST_RELEASE_SECS) {
                debug!(error = %err, "static halt skipped");
            }
        }
    }

    /// Ramp the level feeding the effects chain and the external gate.
    pub fn set_tap_level(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        level: f32,
        at: f64,
        ramp: f64,
    ) -> Result<(), ToolkitError> {
        toolkit.ramp_param(self.tap, Param::Gain, level.max(0.0), at, ramp)
    }
}

impl Instrument for StaticVoice {
    fn layer(&self) -> LayerKind {
        LayerKind::Static
    }

    /// Pitchless: opens the burst stage once for `duration` without going
    /// through the queue.
    fn trigger_notes(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        _notes: &[f32],
        duration: f64,
        at: f64,
    ) -> Result<(), ToolkitError> {
        let duration = duration.max(MIN_BURST_SECS);
        toolkit.ramp_param(
            self.burst_gain,
            Param::Gain,
            1.0,
            at,
            MIN_PERCUSSIVE_ATTACK as f64,
        )?;
        toolkit.ramp_param(
            self.burst_gain,
            Param::Gain,
            0.0,
            at + duration - BURST_RELEASE_SECS,
            BURST_RELEASE_SECS,
        )
    }

    fn set_volume(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        volume_db: f32,
        at: f64,
    ) -> Result<(), ToolkitError> {
        fade_volume(toolkit, self.volume, volume_db, at)
    }

    fn silence(&mut self, toolkit: &mut dyn AudioToolkit, at: f64) {
        self.queue.clear();
        if let Err(err) =
            toolkit.ramp_param(self.burst_gain, Param::Gain, 0.0, at, BURST_RELEASE_SECS)
        {
            debug!(error = %err, "static silence skipped");
        }
    }

    fn dispose(&mut self, toolkit: &mut dyn AudioToolkit) {
        self.queue.clear();
        self.active = None;
        self.bag.release(toolkit);
    }

    fn node_count(&self) -> usize {
        self.bag.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::{LedgerEvent, LedgerToolkit, NodeKind};
    use crate::transport::{TempoParam, Transport};

    struct Bench {
        tk: LedgerToolkit,
        rng: Rng,
        transport: Transport<Cue>,
        bus: NodeId,
    }

    impl Bench {
        fn new() -> Self {
            let mut tk = LedgerToolkit::new();
            let bus = tk.create(NodeSpec::gain(1.0)).unwrap();
            Self {
                tk,
                rng: Rng::new(8),
                transport: Transport::new(TempoParam::new(72.0, 60.0, 96.0)),
                bus,
            }
        }

        fn rig(&mut self) -> Rig<'_> {
            Rig {
                toolkit: &mut self.tk,
                rng: &mut self.rng,
                transport: &mut self.transport,
            }
        }

        fn voice(&mut self, routing: Routing) -> StaticVoice {
            StaticVoice::build(&mut self.tk, &mut self.rng, self.bus, -24.0, routing).unwrap()
        }

        fn run(&mut self, voice: &mut StaticVoice, until: f64) {
            while let Some(fired) = self.transport.pop_due(until) {
                assert_eq!(fired.cue, Cue::StaticBurstDone);
                self.tk.set_time(fired.time);
                let mut rig = self.rig();
                voice.on_burst_done(&mut rig, fired.id).unwrap();
            }
        }
    }

    #[test]
    fn noise_starts_once_and_never_stops() {
        let mut bench = Bench::new();
        let mut voice = bench.voice(Routing::Free);
        voice.silence(&mut bench.tk, 1.0);
        let mut rig = bench.rig();
        voice.halt(&mut rig, 2.0);

        let starts = bench
            .tk
            .events()
            .iter()
            .filter(|e| matches!(e, LedgerEvent::Started { node, .. } if *node == voice.noise))
            .count();
        assert_eq!(starts, 1);
        assert!(!bench
            .tk
            .events()
            .iter()
            .any(|e| matches!(e, LedgerEvent::Stopped { .. })));
    }

    #[test]
    fn bursts_play_in_request_order_without_overlap() {
        let mut bench = Bench::new();
        let mut voice = bench.voice(Routing::Free);
        {
            let mut rig = bench.rig();
            voice.trigger_static(&mut rig, 0.5, -10.0, 1.0, None).unwrap();
            voice.trigger_static(&mut rig, 0.4, -12.0, 1.1, Some(1.5)).unwrap();
            voice.trigger_static(&mut rig, 0.3, -14.0, 1.2, None).unwrap();
        }
        assert!(voice.is_bursting());
        assert_eq!(voice.queued_len(), 2);

        bench.run(&mut voice, 10.0);
        let played: Vec<BurstRecord> = voice.recent_bursts().copied().collect();
        assert_eq!(played.len(), 3);
        assert_eq!(
            played.iter().map(|b| b.volume_db).collect::<Vec<_>>(),
            vec![-10.0, -12.0, -14.0]
        );
        for pair in played.windows(2) {
            assert!(pair[1].start >= pair[0].end);
        }
        assert!(!voice.is_bursting());
        assert_eq!(voice.queued_len(), 0);
    }

    #[test]
    fn rate_shift_crossfades_back() {
        let mut bench = Bench::new();
        let mut voice = bench.voice(Routing::Engine);
        let mut rig = bench.rig();
        voice.trigger_static(&mut rig, 0.2, -6.0, 0.5, Some(2.0)).unwrap();
        let ramps = bench.tk.ramps_for(voice.noise, Param::PlaybackRate);
        assert_eq!(ramps.len(), 2);
        assert_eq!(ramps[0].2, 2.0);
        assert_eq!(ramps[1].2, 1.0);
        assert!(ramps.iter().all(|r| r.1 > 0.0));
    }

    #[test]
    fn halt_drops_queue_and_pending_cue() {
        let mut bench = Bench::new();
        let mut voice = bench.voice(Routing::Free);
        let mut rig = bench.rig();
        voice.trigger_static(&mut rig, 1.0, -10.0, 0.0, None).unwrap();
        voice.trigger_static(&mut rig, 1.0, -10.0, 0.0, None).unwrap();
        voice.halt(&mut rig, 0.5);
        assert_eq!(voice.queued_len(), 0);
        assert!(!voice.is_bursting());
        assert_eq!(bench.transport.pending(), 0);
    }

    #[test]
    fn routing_decides_the_output_path() {
        let mut bench = Bench::new();
        let free = bench.voice(Routing::Free);
        assert_eq!(bench.tk.nodes_of_kind(NodeKind::Reverb).len(), 1);
        assert!(bench.tk.reaches(free.tap(), bench.bus));

        let mut bench = Bench::new();
        let engine = bench.voice(Routing::Engine);
        assert!(bench.tk.nodes_of_kind(NodeKind::Reverb).is_empty());
        assert_eq!(engine.routing(), Routing::Engine);
        assert!(free.node_count() > engine.node_count());
    }
}
