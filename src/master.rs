//! Master bus.
//!
//! ```text
//! voices ─> Gain(-10 dB) ─> HighPass 18 Hz ─> Compressor ─> LowPass 4.5 kHz ─> Limiter(-6 dB) ─> Meter ─> output
//! ```
//!
//! Headroom first, then dynamics, then the limiter. Voices connect to
//! `input()` and nowhere else.

use tracing::{trace, warn};

use crate::toolkit::{
    db_to_gain, AudioToolkit, FilterMode, NodeId, NodeSpec, ToolkitError,
};
use crate::voices::NodeBag;

pub const HEADROOM_DB: f32 = -10.0;
pub const DC_BLOCK_HZ: f32 = 18.0;
pub const COMPRESSOR_THRESHOLD_DB: f32 = -18.0;
pub const COMPRESSOR_RATIO: f32 = 3.0;
pub const COMPRESSOR_ATTACK_SECS: f32 = 0.006;
pub const COMPRESSOR_RELEASE_SECS: f32 = 0.25;
pub const TAIL_LOW_PASS_HZ: f32 = 4_500.0;
pub const LIMITER_CEILING_DB: f32 = -6.0;

pub struct MasterBus {
    bag: NodeBag,
    input: NodeId,
    meter: NodeId,
}

impl MasterBus {
    pub fn build(toolkit: &mut dyn AudioToolkit) -> Result<Self, ToolkitError> {
        let (bag, (input, meter)) = NodeBag::assemble(toolkit, |bag, tk| {
            let ids = bag.chain(
                tk,
                &[
                    NodeSpec::gain(db_to_gain(HEADROOM_DB)),
                    NodeSpec::filter(FilterMode::HighPass, DC_BLOCK_HZ, 0.7),
                    NodeSpec::Compressor {
                        threshold_db: COMPRESSOR_THRESHOLD_DB,
                        ratio: COMPRESSOR_RATIO,
                        attack_secs: COMPRESSOR_ATTACK_SECS,
                        release_secs: COMPRESSOR_RELEASE_SECS,
                    },
                    NodeSpec::filter(FilterMode::LowPass, TAIL_LOW_PASS_HZ, 0.7),
                    NodeSpec::Limiter {
                        ceiling_db: LIMITER_CEILING_DB,
                    },
                    NodeSpec::Meter,
                ],
            )?;
            let meter = ids[5];
            tk.connect_to_output(meter)?;
            Ok((ids[0], meter))
        })?;
        Ok(Self { bag, input, meter })
    }

    /// Where every voice connects.
    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn meter(&self) -> NodeId {
        self.meter
    }

    /// Read the meter and warn if it is above `warn_db`. Advisory only.
    pub fn check_level(&self, toolkit: &dyn AudioToolkit, warn_db: f32) -> Option<f32> {
        let level = toolkit.level_db(self.meter)?;
        if level > warn_db {
            warn!(level_db = level, threshold_db = warn_db, "master level is hot");
        } else {
            trace!(level_db = level, "master level");
        }
        Some(level)
    }

    pub fn node_count(&self) -> usize {
        self.bag.len()
    }

    pub fn dispose(&mut self, toolkit: &mut dyn AudioToolkit) {
        self.bag.release(toolkit);
    }
}
