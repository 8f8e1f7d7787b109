//! Instrument voices.
//!
//! Each layer builds a private subgraph on the toolkit and feeds the master
//! bus input. Effect settings are randomized once, at construction, inside
//! fixed bounds: delay feedback never above `MAX_FEEDBACK`, wet mixes never
//! above `MAX_WET`, attacks never shorter than `MIN_PERCUSSIVE_ATTACK`
//! (or `MIN_SUSTAINED_ATTACK` for the choir).
//!
//! A voice owns every node it creates through a `NodeBag`; disposing the
//! voice drains the bag, so each node is released exactly once.

pub mod bell;
pub mod choir;
pub mod drone;
pub mod formants;
pub mod noise;

use tracing::debug;

pub use bell::BellVoice;
pub use choir::{ChoirVoice, Register, ScreamBurst, Vowel};
pub use drone::DroneVoice;
pub use noise::{BurstRecord, StaticVoice};

use crate::config::{LayerKind, Routing};
use crate::cue::Cue;
use crate::random::Rng;
use crate::toolkit::{db_to_gain, AudioToolkit, NodeId, NodeSpec, Param, ToolkitError};
use crate::transport::Transport;

pub const MAX_FEEDBACK: f32 = 0.85;
pub const MAX_WET: f32 = 0.75;
pub const MIN_PERCUSSIVE_ATTACK: f32 = 0.012;
pub const MIN_SUSTAINED_ATTACK: f32 = 0.05;

/// Fade used for volume changes, long enough not to click.
pub const VOLUME_FADE_SECS: f64 = 0.08;

/// Everything a voice or subsystem needs to act: the toolkit, the shared
/// generator and the transport it schedules follow-up cues on.
pub struct Rig<'a> {
    pub toolkit: &'a mut dyn AudioToolkit,
    pub rng: &'a mut Rng,
    pub transport: &'a mut Transport<Cue>,
}

impl Rig<'_> {
    pub fn now(&self) -> f64 {
        self.toolkit.current_time()
    }
}

/// The nodes one voice or subsystem owns.
#[derive(Debug, Default)]
pub struct NodeBag {
    nodes: Vec<NodeId>,
}

impl NodeBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `build` against a fresh bag. If it fails, every node it created
    /// so far is disposed before the error is returned.
    pub fn assemble<T>(
        toolkit: &mut dyn AudioToolkit,
        build: impl FnOnce(&mut NodeBag, &mut dyn AudioToolkit) -> Result<T, ToolkitError>,
    ) -> Result<(NodeBag, T), ToolkitError> {
        let mut bag = NodeBag::new();
        match build(&mut bag, &mut *toolkit) {
            Ok(value) => Ok((bag, value)),
            Err(err) => {
                bag.release(toolkit);
                Err(err)
            }
        }
    }

    pub fn create(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        spec: NodeSpec,
    ) -> Result<NodeId, ToolkitError> {
        let id = toolkit.create(spec)?;
        self.nodes.push(id);
        Ok(id)
    }

    /// Create `specs` and connect them in series. Returns the ids in order.
    pub fn chain(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        specs: &[NodeSpec],
    ) -> Result<Vec<NodeId>, ToolkitError> {
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = self.create(toolkit, *spec)?;
            if let Some(prev) = ids.last() {
                toolkit.connect(*prev, id)?;
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Dispose every owned node. Calling it again does nothing.
    pub fn release(&mut self, toolkit: &mut dyn AudioToolkit) {
        for id in self.nodes.drain(..) {
            if let Err(err) = toolkit.dispose(id) {
                debug!(node = %id, error = %err, "node already gone");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Randomized wet mix, capped at `MAX_WET`.
pub(crate) fn wet(rng: &mut Rng, min: f32, max: f32) -> f32 {
    rng.range(min, max).min(MAX_WET)
}

/// Randomized delay feedback, capped at `MAX_FEEDBACK`.
pub(crate) fn feedback(rng: &mut Rng, min: f32, max: f32) -> f32 {
    rng.range(min, max).min(MAX_FEEDBACK)
}

pub(crate) fn fade_volume(
    toolkit: &mut dyn AudioToolkit,
    node: NodeId,
    volume_db: f32,
    at: f64,
) -> Result<(), ToolkitError> {
    toolkit.ramp_param(node, Param::Gain, db_to_gain(volume_db), at, VOLUME_FADE_SECS)
}

/// The capability set every layer voice provides.
pub trait Instrument {
    fn layer(&self) -> LayerKind;

    /// Play `notes` (Hz) for `duration` seconds starting at `at`. Voices
    /// without pitch ignore the notes.
    fn trigger_notes(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        notes: &[f32],
        duration: f64,
        at: f64,
    ) -> Result<(), ToolkitError>;

    fn set_volume(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        volume_db: f32,
        at: f64,
    ) -> Result<(), ToolkitError>;

    /// Release any sounding notes at `at` without disposing anything.
    fn silence(&mut self, toolkit: &mut dyn AudioToolkit, at: f64);

    /// Dispose every owned node. Safe to call more than once.
    fn dispose(&mut self, toolkit: &mut dyn AudioToolkit);

    /// Nodes currently owned.
    fn node_count(&self) -> usize;
}

/// One layer's voice, chosen by layer at construction.
pub enum SynthHandle {
    Drone(DroneVoice),
    Bell(BellVoice),
    Choir(ChoirVoice),
    Static(StaticVoice),
}

impl SynthHandle {
    pub fn build(
        layer: LayerKind,
        toolkit: &mut dyn AudioToolkit,
        rng: &mut Rng,
        destination: NodeId,
        volume_db: f32,
        routing: Routing,
    ) -> Result<Self, ToolkitError> {
        let handle = match layer {
            LayerKind::Drone => {
                SynthHandle::Drone(DroneVoice::build(toolkit, rng, destination, volume_db)?)
            }
            LayerKind::Bell => {
                SynthHandle::Bell(BellVoice::build(toolkit, rng, destination, volume_db)?)
            }
            LayerKind::Choir => {
                SynthHandle::Choir(ChoirVoice::build(toolkit, rng, destination, volume_db)?)
            }
            LayerKind::Static => SynthHandle::Static(StaticVoice::build(
                toolkit,
                rng,
                destination,
                volume_db,
                routing,
            )?),
        };
        Ok(handle)
    }

    fn instrument(&self) -> &dyn Instrument {
        match self {
            SynthHandle::Drone(v) => v,
            SynthHandle::Bell(v) => v,
            SynthHandle::Choir(v) => v,
            SynthHandle::Static(v) => v,
        }
    }

    fn instrument_mut(&mut self) -> &mut dyn Instrument {
        match self {
            SynthHandle::Drone(v) => v,
            SynthHandle::Bell(v) => v,
            SynthHandle::Choir(v) => v,
            SynthHandle::Static(v) => v,
        }
    }

    pub fn as_choir_mut(&mut self) -> Option<&mut ChoirVoice> {
        match self {
            SynthHandle::Choir(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_static_mut(&mut self) -> Option<&mut StaticVoice> {
        match self {
            SynthHandle::Static(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_static(&self) -> Option<&StaticVoice> {
        match self {
            SynthHandle::Static(v) => Some(v),
            _ => None,
        }
    }
}

impl Instrument for SynthHandle {
    fn layer(&self) -> LayerKind {
        self.instrument().layer()
    }

    fn trigger_notes(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        notes: &[f32],
        duration: f64,
        at: f64,
    ) -> Result<(), ToolkitError> {
        self.instrument_mut()
            .trigger_notes(toolkit, notes, duration, at)
    }

    fn set_volume(
        &mut self,
        toolkit: &mut dyn AudioToolkit,
        volume_db: f32,
        at: f64,
    ) -> Result<(), ToolkitError> {
        self.instrument_mut().set_volume(toolkit, volume_db, at)
    }

    fn silence(&mut self, toolkit: &mut dyn AudioToolkit, at: f64) {
        self.instrument_mut().silence(toolkit, at)
    }

    fn dispose(&mut self, toolkit: &mut dyn AudioToolkit) {
        self.instrument_mut().dispose(toolkit)
    }

    fn node_count(&self) -> usize {
        self.instrument().node_count()
    }
}
