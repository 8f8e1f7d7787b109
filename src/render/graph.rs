//! Audio-thread half of the render toolkit.
//!
//! ```text
//!   control thread                      audio thread
//!  ┌──────────────┐  Command ring   ┌─────────────────────┐
//!  │RenderToolkit │ ──────────────> │ RenderGraph         │
//!  │              │                 │  slots[NodeSlot]    │
//!  │              │ <────────────── │  order (topological)│
//!  └──────────────┘  garbage ring   └─────────────────────┘
//! ```
//!
//! `process` drains pending commands, then renders in sub-blocks of
//! `BLOCK_FRAMES`. Nodes are evaluated in dependency order (audio inputs
//! and modulators before the node that reads them); the order is rebuilt
//! only when the wiring changes. Disposed nodes are sent back to the
//! control thread so the audio thread never frees.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};

use super::node::{Frame, GateEvent, GateKind, NodeSlot, ParamBlock};
use super::{Command, BLOCK_FRAMES, MAX_NODES};
use crate::toolkit::NodeId;

pub struct RenderGraph {
    sample_rate: f32,
    slots: Vec<Option<Box<NodeSlot>>>,
    order: Vec<usize>,
    placed: Vec<bool>,
    dirty: bool,
    commands: Consumer<Command>,
    garbage: Producer<Box<NodeSlot>>,
    /// Disposed slots waiting for room on the garbage ring.
    held: Vec<Box<NodeSlot>>,
    clock: Arc<AtomicU64>,
    frame: u64,
    input: Vec<Frame>,
    params: Box<ParamBlock>,
}

impl RenderGraph {
    pub(super) fn new(
        sample_rate: f32,
        commands: Consumer<Command>,
        garbage: Producer<Box<NodeSlot>>,
        clock: Arc<AtomicU64>,
    ) -> Self {
        Self {
            sample_rate,
            slots: (0..MAX_NODES).map(|_| None).collect(),
            order: Vec::with_capacity(MAX_NODES),
            placed: vec![false; MAX_NODES],
            dirty: false,
            commands,
            garbage,
            held: Vec::with_capacity(MAX_NODES),
            clock,
            frame: 0,
            input: vec![[0.0; 2]; BLOCK_FRAMES],
            params: ParamBlock::new(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Frames rendered so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn live_nodes(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Render interleaved-free stereo frames.
    pub fn process(&mut self, out: &mut [Frame]) {
        self.drain_commands();
        self.flush_garbage();
        if self.dirty {
            self.rebuild_order();
        }
        for chunk in out.chunks_mut(BLOCK_FRAMES) {
            self.render_block(chunk);
        }
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut NodeSlot> {
        self.slots
            .get_mut(super::slot_of(id))?
            .as_deref_mut()
            .filter(|slot| slot.id == id)
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Insert(slot) => {
                let index = super::slot_of(slot.id);
                if let Some(old) = self.slots[index].replace(slot) {
                    self.held.push(old);
                }
                self.dirty = true;
            }
            Command::Connect { from, to } => {
                let from_slot = super::slot_of(from);
                let linked = match self.slot_mut(to) {
                    Some(node) => {
                        if !node.inputs.contains(&from_slot) {
                            node.inputs.push(from_slot);
                        }
                        true
                    }
                    None => false,
                };
                self.dirty |= linked;
            }
            Command::Modulate {
                source,
                target,
                param,
            } => {
                let source_slot = super::slot_of(source);
                let linked = match self.slot_mut(target) {
                    Some(node) => match node.lane_index(param) {
                        Some(lane) => {
                            node.modulators.push((source_slot, lane));
                            true
                        }
                        None => false,
                    },
                    None => false,
                };
                self.dirty |= linked;
            }
            Command::ConnectOutput(node) => {
                if let Some(node) = self.slot_mut(node) {
                    node.to_output = true;
                }
            }
            Command::Start { node, frame } => {
                if let Some(node) = self.slot_mut(node) {
                    node.window.start(frame);
                }
            }
            Command::Stop { node, frame } => {
                if let Some(node) = self.slot_mut(node) {
                    node.window.stop(frame);
                }
            }
            Command::Automate { node, param, event } => {
                if let Some(lane) = self.slot_mut(node).and_then(|n| n.lane_mut(param)) {
                    lane.schedule(event);
                }
            }
            Command::Gate { node, event } => {
                if let Some(node) = self.slot_mut(node) {
                    node.schedule_gate(event);
                }
            }
            Command::Release { node, frame } => {
                if let Some(node) = self.slot_mut(node) {
                    node.schedule_gate(GateEvent {
                        at: frame,
                        kind: GateKind::ReleaseAll,
                    });
                }
            }
            Command::Dispose(id) => {
                let index = super::slot_of(id);
                let matches = self.slots[index].as_ref().is_some_and(|s| s.id == id);
                if matches {
                    if let Some(slot) = self.slots[index].take() {
                        self.held.push(slot);
                    }
                    for other in self.slots.iter_mut().flatten() {
                        other.unlink(index);
                    }
                    self.dirty = true;
                }
            }
        }
    }

    fn flush_garbage(&mut self) {
        while let Some(slot) = self.held.pop() {
            if let Err(rtrb::PushError::Full(slot)) = self.garbage.push(slot) {
                self.held.push(slot);
                break;
            }
        }
    }

    /// Repeated sweeps placing every node whose inputs and modulators are
    /// already placed. The control side rejects cycles, so every sweep
    /// places at least one node.
    fn rebuild_order(&mut self) {
        self.order.clear();
        self.placed.fill(false);

        loop {
            let before = self.order.len();
            for index in 0..self.slots.len() {
                if self.placed[index] {
                    continue;
                }
                let Some(slot) = self.slots[index].as_deref() else {
                    continue;
                };
                let ready = slot
                    .inputs
                    .iter()
                    .chain(slot.modulators.iter().map(|(s, _)| s))
                    .all(|dep| self.placed[*dep] || self.slots[*dep].is_none());
                if ready {
                    self.placed[index] = true;
                    self.order.push(index);
                }
            }
            if self.order.len() == before {
                break;
            }
        }
        self.dirty = false;
    }

    fn render_block(&mut self, out: &mut [Frame]) {
        let len = out.len();
        let start = self.frame;

        for k in 0..self.order.len() {
            let index = self.order[k];
            let Some(mut slot) = self.slots[index].take() else {
                continue;
            };

            let input = &mut self.input[..len];
            input.fill([0.0; 2]);
            for &src in &slot.inputs {
                if let Some(source) = self.slots[src].as_deref() {
                    for (acc, x) in input.iter_mut().zip(&source.buffer[..len]) {
                        acc[0] += x[0];
                        acc[1] += x[1];
                    }
                }
            }

            for lane in slot.lanes.iter_mut() {
                let row = self.params.row_mut(lane.param());
                for (n, value) in row.iter_mut().enumerate().take(len) {
                    *value = lane.tick(start + n as u64);
                }
            }
            for &(src, lane) in &slot.modulators {
                let (Some(source), Some(lane)) = (self.slots[src].as_deref(), slot.lanes.get(lane))
                else {
                    continue;
                };
                let row = self.params.row_mut(lane.param());
                for (value, x) in row.iter_mut().zip(&source.buffer[..len]) {
                    *value += x[0];
                }
            }

            slot.render(&self.input[..len], &self.params, start, len, self.sample_rate);
            self.slots[index] = Some(slot);
        }

        out.fill([0.0; 2]);
        for &index in &self.order {
            if let Some(slot) = self.slots[index].as_deref() {
                if slot.to_output {
                    for (o, x) in out.iter_mut().zip(&slot.buffer[..len]) {
                        o[0] += x[0];
                        o[1] += x[1];
                    }
                }
            }
        }

        self.frame += len as u64;
        self.clock.store(self.frame, Ordering::Release);
    }
}
