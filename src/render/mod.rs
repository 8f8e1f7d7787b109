//! Realtime `AudioToolkit`.
//!
//! The toolkit is split across two threads:
//!
//! ```text
//!  engine ──calls──> RenderToolkit ──Command──> rtrb ──> RenderGraph ──> OutputHost (cpal)
//!                       │   ^                                 │
//!                       │   └──── Box<NodeSlot> (disposed) ───┘
//!                       └─ mirror graph: validates every call synchronously
//! ```
//!
//! `RenderToolkit` keeps a mirror of the node graph so every call is
//! validated on the calling thread and errors come back immediately
//! (unknown node, invalid parameter, cycle). Node state is allocated here
//! and moved to the audio thread; times in seconds become absolute frame
//! numbers, and the audio side applies them sample-accurately.
//!
//! Node ids pack a slot index with a generation counter, so an id that
//! outlives its node never addresses the slot's next occupant.

pub mod automation;
pub mod graph;
pub mod node;
pub mod output;
pub mod poly;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, trace};

pub use graph::RenderGraph;
pub use node::Frame;
pub use output::{list_devices, DeviceInfo, OutputError, OutputHost};

use self::automation::LaneEvent;
use self::node::{GateEvent, GateKind, NodeSlot};
use crate::toolkit::{AudioToolkit, NodeId, NodeSpec, Param, ToolkitError, Trigger};

/// Frames rendered per inner block; automation and gates are still applied
/// per sample.
pub const BLOCK_FRAMES: usize = 128;
/// Nodes alive at once.
pub const MAX_NODES: usize = 4096;
const COMMAND_CAPACITY: usize = 16_384;
const SLOT_BITS: u32 = 16;
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;

pub(crate) fn slot_of(id: NodeId) -> usize {
    (id.0 & SLOT_MASK) as usize
}

fn generation_of(id: NodeId) -> u32 {
    id.0 >> SLOT_BITS
}

/// Messages from the control thread to the audio thread. Times are absolute
/// frames.
pub enum Command {
    Insert(Box<NodeSlot>),
    Connect { from: NodeId, to: NodeId },
    Modulate { source: NodeId, target: NodeId, param: Param },
    ConnectOutput(NodeId),
    Start { node: NodeId, frame: u64 },
    Stop { node: NodeId, frame: u64 },
    Automate { node: NodeId, param: Param, event: LaneEvent },
    Gate { node: NodeId, event: GateEvent },
    Release { node: NodeId, frame: u64 },
    Dispose(NodeId),
}

struct MirrorNode {
    id: NodeId,
    spec: NodeSpec,
    /// Downstream edges: audio connections and modulation targets.
    outputs: Vec<NodeId>,
    level: Option<Arc<AtomicU32>>,
}

/// Control-side handle implementing `AudioToolkit`.
pub struct RenderToolkit {
    sample_rate: f32,
    mirror: Vec<Option<MirrorNode>>,
    generations: Vec<u32>,
    free: Vec<usize>,
    commands: Producer<Command>,
    garbage: Consumer<Box<NodeSlot>>,
    clock: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    seed: u32,
    created: usize,
    disposed: usize,
}

/// Build a connected toolkit/graph pair. The graph goes to whoever drives
/// the audio callback (`OutputHost`, or a test pulling blocks by hand).
pub fn render_pair(sample_rate: f32) -> (RenderToolkit, RenderGraph) {
    let (command_tx, command_rx) = RingBuffer::<Command>::new(COMMAND_CAPACITY);
    let (garbage_tx, garbage_rx) = RingBuffer::<Box<NodeSlot>>::new(MAX_NODES);
    let clock = Arc::new(AtomicU64::new(0));

    let toolkit = RenderToolkit {
        sample_rate,
        mirror: (0..MAX_NODES).map(|_| None).collect(),
        generations: vec![0; MAX_NODES],
        free: (0..MAX_NODES).rev().collect(),
        commands: command_tx,
        garbage: garbage_rx,
        clock: clock.clone(),
        running: Arc::new(AtomicBool::new(false)),
        seed: 0x2545_F491,
        created: 0,
        disposed: 0,
    };
    let graph = RenderGraph::new(sample_rate, command_rx, garbage_tx, clock);
    (toolkit, graph)
}

impl RenderToolkit {
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Shared flag the output host raises while its stream plays.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn set_running(&mut self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn disposed_count(&self) -> usize {
        self.disposed
    }

    pub fn live_count(&self) -> usize {
        self.created - self.disposed
    }

    /// Drop node state the audio thread has handed back.
    pub fn collect_garbage(&mut self) -> usize {
        let mut freed = 0;
        while let Ok(slot) = self.garbage.pop() {
            drop(slot);
            freed += 1;
        }
        if freed > 0 {
            trace!(freed, "collected disposed render nodes");
        }
        freed
    }

    fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    fn live(&self, id: NodeId) -> Result<&MirrorNode, ToolkitError> {
        self.mirror
            .get(slot_of(id))
            .and_then(Option::as_ref)
            .filter(|node| node.id == id)
            .ok_or(ToolkitError::UnknownNode(id))
    }

    fn live_mut(&mut self, id: NodeId) -> Result<&mut MirrorNode, ToolkitError> {
        self.mirror
            .get_mut(slot_of(id))
            .and_then(Option::as_mut)
            .filter(|node| node.id == id)
            .ok_or(ToolkitError::UnknownNode(id))
    }

    fn check_param(&self, id: NodeId, param: Param) -> Result<(), ToolkitError> {
        if self.live(id)?.spec.accepts(param) {
            Ok(())
        } else {
            Err(ToolkitError::InvalidParam { node: id, param })
        }
    }

    /// Whether `to` is reachable from `from` along audio or modulation edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; MAX_NODES];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            let index = slot_of(id);
            if std::mem::replace(&mut seen[index], true) {
                continue;
            }
            if let Ok(node) = self.live(id) {
                stack.extend(node.outputs.iter().copied());
            }
        }
        false
    }

    fn send(&mut self, command: Command) -> Result<(), ToolkitError> {
        self.commands
            .push(command)
            .map_err(|_| ToolkitError::QueueFull)
    }

    fn link(&mut self, from: NodeId, to: NodeId, command: Command) -> Result<(), ToolkitError> {
        self.live(from)?;
        self.live(to)?;
        if from == to || self.reaches(to, from) {
            return Err(ToolkitError::Cycle { from, to });
        }
        self.send(command)?;
        let node = self.live_mut(from)?;
        if !node.outputs.contains(&to) {
            node.outputs.push(to);
        }
        Ok(())
    }
}

impl AudioToolkit for RenderToolkit {
    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn create(&mut self, spec: NodeSpec) -> Result<NodeId, ToolkitError> {
        self.collect_garbage();
        let index = self
            .free
            .pop()
            .ok_or(ToolkitError::GraphFull(self.live_count()))?;
        let generation = self.generations[index].wrapping_add(1) & 0xFFFF;
        let id = NodeId((generation << SLOT_BITS) | index as u32);

        self.seed ^= self.seed << 13;
        self.seed ^= self.seed >> 17;
        self.seed ^= self.seed << 5;

        let level = matches!(spec, NodeSpec::Meter)
            .then(|| Arc::new(AtomicU32::new((-120.0f32).to_bits())));
        let slot = NodeSlot::new(id, &spec, self.sample_rate, self.seed, level.clone());

        if self.commands.push(Command::Insert(slot)).is_err() {
            self.free.push(index);
            return Err(ToolkitError::QueueFull);
        }
        self.generations[index] = generation;
        self.mirror[index] = Some(MirrorNode {
            id,
            spec,
            outputs: Vec::new(),
            level,
        });
        self.created += 1;
        debug_assert_eq!(generation_of(id), generation);
        Ok(id)
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), ToolkitError> {
        self.link(from, to, Command::Connect { from, to })
    }

    fn modulate(
        &mut self,
        source: NodeId,
        target: NodeId,
        param: Param,
    ) -> Result<(), ToolkitError> {
        self.check_param(target, param)?;
        self.link(
            source,
            target,
            Command::Modulate {
                source,
                target,
                param,
            },
        )
    }

    fn connect_to_output(&mut self, node: NodeId) -> Result<(), ToolkitError> {
        self.live(node)?;
        self.send(Command::ConnectOutput(node))
    }

    fn start(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError> {
        self.live(node)?;
        let frame = self.frame_at(at);
        self.send(Command::Start { node, frame })
    }

    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError> {
        self.live(node)?;
        let frame = self.frame_at(at);
        self.send(Command::Stop { node, frame })
    }

    fn set_param(
        &mut self,
        node: NodeId,
        param: Param,
        value: f32,
        at: f64,
    ) -> Result<(), ToolkitError> {
        self.check_param(node, param)?;
        let event = LaneEvent::Set {
            at: self.frame_at(at),
            value,
        };
        self.send(Command::Automate { node, param, event })
    }

    fn ramp_param(
        &mut self,
        node: NodeId,
        param: Param,
        target: f32,
        at: f64,
        duration: f64,
    ) -> Result<(), ToolkitError> {
        self.check_param(node, param)?;
        let event = LaneEvent::Ramp {
            at: self.frame_at(at),
            end: self.frame_at(at + duration.max(0.0)),
            target,
        };
        self.send(Command::Automate { node, param, event })
    }

    fn trigger(&mut self, node: NodeId, trigger: &Trigger) -> Result<(), ToolkitError> {
        let live = self.live(node)?;
        if !live.spec.is_triggerable() {
            return Err(ToolkitError::InvalidTrigger(format!(
                "{:?} node {node} cannot be triggered",
                live.spec.kind()
            )));
        }
        trigger.validate()?;

        let on = self.frame_at(trigger.at);
        let off = self.frame_at(trigger.at + trigger.duration).max(on + 1);
        self.send(Command::Gate {
            node,
            event: GateEvent {
                at: on,
                kind: GateKind::On {
                    notes: trigger.notes,
                    velocity: trigger.velocity,
                },
            },
        })?;
        self.send(Command::Gate {
            node,
            event: GateEvent {
                at: off,
                kind: GateKind::Off {
                    notes: trigger.notes,
                },
            },
        })
    }

    fn release(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError> {
        self.live(node)?;
        let frame = self.frame_at(at);
        self.send(Command::Release { node, frame })
    }

    fn level_db(&self, meter: NodeId) -> Option<f32> {
        let level = self.live(meter).ok()?.level.as_ref()?;
        Some(f32::from_bits(level.load(Ordering::Relaxed)))
    }

    fn dispose(&mut self, node: NodeId) -> Result<(), ToolkitError> {
        self.live(node)?;
        self.send(Command::Dispose(node))?;

        let index = slot_of(node);
        self.mirror[index] = None;
        for other in self.mirror.iter_mut().flatten() {
            other.outputs.retain(|o| *o != node);
        }
        self.free.push(index);
        self.disposed += 1;
        self.collect_garbage();
        Ok(())
    }
}

impl Drop for RenderToolkit {
    fn drop(&mut self) {
        let live = self.live_count();
        if live > 0 {
            debug!(live, "render toolkit dropped with live nodes");
        }
    }
}
