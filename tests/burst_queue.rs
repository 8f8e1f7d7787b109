use ambient_drift::cue::Cue;
use ambient_drift::toolkit::{AudioToolkit, NodeSpec};
use ambient_drift::transport::{TempoParam, Transport};
use ambient_drift::voices::{BurstRecord, Rig, StaticVoice};
use ambient_drift::{LedgerToolkit, Rng, Routing};

struct Bench {
    tk: LedgerToolkit,
    rng: Rng,
    transport: Transport<Cue>,
    voice: StaticVoice,
}

impl Bench {
    fn new(seed: u32) -> Self {
        let mut tk = LedgerToolkit::new();
        let mut rng = Rng::new(seed);
        let bus = tk.create(NodeSpec::gain(1.0)).unwrap();
        let voice = StaticVoice::build(&mut tk, &mut rng, bus, -12.0, Routing::Free).unwrap();
        Self {
            tk,
            rng,
            transport: Transport::new(TempoParam::new(72.0, 60.0, 96.0)),
            voice,
        }
    }

    fn request(&mut self, duration: f64, volume_db: f32, start: f64) {
        let mut rig = Rig {
            toolkit: &mut self.tk,
            rng: &mut self.rng,
            transport: &mut self.transport,
        };
        self.voice
            .trigger_static(&mut rig, duration, volume_db, start, None)
            .unwrap();
    }

    /// Fire every cue up to `until`, routing burst completions back into
    /// the voice.
    fn run(&mut self, until: f64) {
        while let Some(fired) = self.transport.pop_due(until) {
            if fired.cue == Cue::StaticBurstDone {
                self.tk.set_time(fired.time);
                let mut rig = Rig {
                    toolkit: &mut self.tk,
                    rng: &mut self.rng,
                    transport: &mut self.transport,
                };
                self.voice.on_burst_done(&mut rig, fired.id).unwrap();
            }
        }
    }

    fn played(&self) -> Vec<BurstRecord> {
        self.voice.recent_bursts().copied().collect()
    }
}

#[test]
fn overlapping_requests_play_in_order_without_overlap() {
    let mut bench = Bench::new(7);
    bench.request(0.5, -6.0, 1.0);
    bench.request(0.4, -9.0, 1.1);
    bench.request(0.3, -12.0, 1.2);
    assert!(bench.voice.is_bursting());
    assert_eq!(bench.voice.queued_len(), 2);

    bench.run(10.0);
    let played = bench.played();
    assert_eq!(played.len(), 3);
    assert_eq!(
        played.iter().map(|b| b.volume_db).collect::<Vec<_>>(),
        vec![-6.0, -9.0, -12.0]
    );
    assert_eq!(played[0].start, 1.0);
    for pair in played.windows(2) {
        assert!(pair[0].end <= pair[1].start, "{pair:?}");
    }
    assert!(!bench.voice.is_bursting());
    assert_eq!(bench.voice.queued_len(), 0);
}

#[test]
fn later_requests_keep_their_own_start() {
    let mut bench = Bench::new(9);
    bench.request(0.2, -6.0, 1.0);
    bench.run(5.0);
    bench.request(0.2, -6.0, 6.0);
    bench.run(10.0);
    let played = bench.played();
    assert_eq!(played.len(), 2);
    assert_eq!(played[1].start, 6.0);
}

#[test]
fn many_queued_bursts_all_play() {
    let mut bench = Bench::new(13);
    for i in 0..20 {
        bench.request(0.1 + 0.01 * i as f64, -10.0 - i as f32 * 0.1, 0.5);
    }
    bench.run(100.0);
    let played = bench.played();
    assert_eq!(played.len(), 20);
    for pair in played.windows(2) {
        assert!(pair[0].end <= pair[1].start);
        assert!(pair[0].volume_db > pair[1].volume_db);
    }
}

#[test]
fn halt_drops_the_queue() {
    let mut bench = Bench::new(21);
    bench.request(1.0, -6.0, 1.0);
    bench.request(1.0, -6.0, 1.0);
    bench.request(1.0, -6.0, 1.0);

    let mut rig = Rig {
        toolkit: &mut bench.tk,
        rng: &mut bench.rng,
        transport: &mut bench.transport,
    };
    bench.voice.halt(&mut rig, 1.2);
    assert_eq!(bench.voice.queued_len(), 0);
    assert!(!bench.voice.is_bursting());

    bench.run(10.0);
    assert_eq!(bench.played().len(), 1);
}

#[test]
fn stale_completion_is_ignored() {
    let mut bench = Bench::new(33);
    bench.request(0.5, -6.0, 1.0);
    bench.request(0.5, -6.0, 1.0);

    let stale = bench.transport.schedule_once(0.0, Cue::StaticBurstDone);
    bench.run(0.5);
    assert!(!bench.transport.cancel(stale));
    assert!(bench.voice.is_bursting());
    assert_eq!(bench.voice.queued_len(), 1);
    assert_eq!(bench.played().len(), 1);
}
