//! The closed set of things the transport can call back into.
//!
//! A cue is plain data; the engine matches on it when it fires and routes
//! it to the subsystem that owns it.

use crate::config::LayerKind;
use crate::rhythm::Lane;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cue {
    /// First chord of a layer after `play`.
    InitialChord(LayerKind),
    /// One iteration of a layer's generative loop.
    LayerLoop(LayerKind),
    TempoCycle,
    /// The sounding static burst has ended.
    StaticBurstDone,
    ChoirBurstRestore,
    MeterCheck,
    Rhythm(RhythmCue),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RhythmCue {
    Step(Lane),
    Reroll,
    Scene,
    WindowCheck,
    WindowBurst,
    WindowClose,
}

impl Cue {
    /// Cues that belong to a layer's loop or the rhythm engine, which `stop`
    /// cancels.
    pub fn is_musical(&self) -> bool {
        matches!(
            self,
            Cue::InitialChord(_) | Cue::LayerLoop(_) | Cue::Rhythm(_)
        )
    }
}
