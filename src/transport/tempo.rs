//! Drifting tempo.
//!
//! One recurring cycle: pick a target and a transition length, ramp the
//! clock's tempo parameter there, hold for a while, repeat. The ramp lives on
//! the tempo parameter itself, so cancelling pattern cues never interrupts a
//! transition already in progress.

use tracing::debug;

use super::{EventId, Transport};
use crate::config::TempoSettings;
use crate::random::Rng;

pub struct TempoController {
    settings: TempoSettings,
    cycle: Option<EventId>,
    cycles: u64,
}

impl TempoController {
    pub fn new(settings: TempoSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            cycle: None,
            cycles: 0,
        }
    }

    pub fn settings(&self) -> &TempoSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.cycle.is_some()
    }

    /// Number of ramps started since creation.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Schedule the first cycle at `at`. Does nothing if already running.
    pub fn start<E: Clone>(&mut self, transport: &mut Transport<E>, at: f64, cue: E) {
        if self.cycle.is_some() {
            return;
        }
        self.cycle = Some(transport.schedule_once(at, cue));
    }

    /// Run one cycle at `now`: start a ramp and schedule the next cycle after
    /// the ramp and a hold.
    pub fn on_cycle<E: Clone>(
        &mut self,
        transport: &mut Transport<E>,
        rng: &mut Rng,
        now: f64,
        cue: E,
    ) {
        if self.cycle.is_none() {
            return;
        }
        let s = &self.settings;
        let target = rng.next_float(s.min_bpm, s.max_bpm);
        let ramp = rng.next_float(s.ramp_secs[0], s.ramp_secs[1]);
        let hold = rng.next_float(s.hold_secs[0], s.hold_secs[1]);

        transport.tempo.ramp_to(target, now, ramp);
        self.cycles += 1;
        debug!(
            from = transport.tempo.value_at(now),
            to = target,
            ramp_secs = ramp,
            hold_secs = hold,
            "tempo drift"
        );

        self.cycle = Some(transport.schedule_once(now + ramp + hold, cue));
    }

    /// Cancel the cycle and ramp back to the base tempo.
    pub fn stop<E: Clone>(&mut self, transport: &mut Transport<E>, now: f64) {
        if let Some(id) = self.cycle.take() {
            transport.cancel(id);
        }
        transport
            .tempo
            .ramp_to(self.settings.base_bpm, now, self.settings.stop_ramp_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TempoParam;

    #[derive(Debug, Clone, PartialEq)]
    struct Cycle;

    fn setup(settings: TempoSettings) -> (TempoController, Transport<Cycle>) {
        let transport = Transport::new(TempoParam::new(
            settings.base_bpm,
            settings.min_bpm,
            settings.max_bpm,
        ));
        (TempoController::new(settings), transport)
    }

    #[test]
    fn tempo_never_leaves_bounds() {
        let settings = TempoSettings {
            ramp_secs: [0.5, 3.0],
            hold_secs: [0.0, 2.0],
            ..TempoSettings::default()
        };
        for seed in 1..20 {
            let (mut ctl, mut transport) = setup(settings);
            let mut rng = Rng::new(seed);
            ctl.start(&mut transport, 0.0, Cycle);

            let mut t = 0.0;
            while t < 300.0 {
                while let Some(fired) = transport.pop_due(t) {
                    ctl.on_cycle(&mut transport, &mut rng, fired.time, fired.cue);
                }
                let bpm = transport.tempo.value_at(t);
                assert!(
                    (settings.min_bpm..=settings.max_bpm).contains(&bpm),
                    "seed {seed}: {bpm} at {t}"
                );
                t += 0.25;
            }
            assert!(ctl.cycles() > 10);
        }
    }

    #[test]
    fn stop_cancels_cycle_and_returns_to_base() {
        let settings = TempoSettings::default();
        let (mut ctl, mut transport) = setup(settings);
        let mut rng = Rng::new(3);

        ctl.start(&mut transport, 0.0, Cycle);
        let fired = transport.pop_due(0.0).unwrap();
        ctl.on_cycle(&mut transport, &mut rng, fired.time, fired.cue);
        assert_eq!(transport.pending(), 1);

        ctl.stop(&mut transport, 5.0);
        assert!(!ctl.is_active());
        assert_eq!(transport.pending(), 0);
        assert_eq!(
            transport.tempo.value_at(5.0 + settings.stop_ramp_secs),
            settings.base_bpm
        );
    }

    #[test]
    fn start_is_idempotent() {
        let (mut ctl, mut transport) = setup(TempoSettings::default());
        ctl.start(&mut transport, 0.0, Cycle);
        ctl.start(&mut transport, 1.0, Cycle);
        assert_eq!(transport.pending(), 1);
    }
}
