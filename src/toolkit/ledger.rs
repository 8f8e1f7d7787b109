//! Headless, instrumented `AudioToolkit`.
//!
//! Produces no sound. Every call is validated the same way the realtime
//! graph validates it and then written to an event ledger, so tests can
//! assert on what the engine asked for: which nodes exist, what they are
//! wired to, when they were triggered, and whether everything constructed
//! was eventually disposed.

use std::collections::{BTreeMap, HashMap};

use super::{AudioToolkit, NodeId, NodeKind, NodeSpec, Param, ToolkitError, Trigger};

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Created { node: NodeId, kind: NodeKind },
    Connected { from: NodeId, to: NodeId },
    Modulated { source: NodeId, target: NodeId, param: Param },
    RoutedToOutput { node: NodeId },
    Started { node: NodeId, at: f64 },
    Stopped { node: NodeId, at: f64 },
    Set { node: NodeId, param: Param, value: f32, at: f64 },
    Ramp { node: NodeId, param: Param, target: f32, at: f64, duration: f64 },
    Triggered { node: NodeId, trigger: Trigger },
    Released { node: NodeId, at: f64 },
    Disposed { node: NodeId },
}

impl LedgerEvent {
    pub fn node(&self) -> NodeId {
        match self {
            LedgerEvent::Created { node, .. }
            | LedgerEvent::RoutedToOutput { node }
            | LedgerEvent::Started { node, .. }
            | LedgerEvent::Stopped { node, .. }
            | LedgerEvent::Set { node, .. }
            | LedgerEvent::Ramp { node, .. }
            | LedgerEvent::Triggered { node, .. }
            | LedgerEvent::Released { node, .. }
            | LedgerEvent::Disposed { node } => *node,
            LedgerEvent::Connected { from, .. } => *from,
            LedgerEvent::Modulated { target, .. } => *target,
        }
    }
}

/// A live node as the ledger sees it.
#[derive(Debug, Clone)]
pub struct LedgerNode {
    pub spec: NodeSpec,
    pub outputs: Vec<NodeId>,
    pub modulates: Vec<(NodeId, Param)>,
    pub to_output: bool,
    pub running: bool,
    /// Last value written or ramped to, per parameter.
    pub params: BTreeMap<Param, f32>,
    pub triggers: usize,
}

pub struct LedgerToolkit {
    time: f64,
    running: bool,
    next_id: u32,
    nodes: HashMap<NodeId, LedgerNode>,
    events: Vec<LedgerEvent>,
    recording: bool,
    created: usize,
    disposed: usize,
    levels: HashMap<NodeId, f32>,
    reject_triggers: bool,
}

impl LedgerToolkit {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            running: true,
            next_id: 0,
            nodes: HashMap::new(),
            events: Vec::new(),
            recording: true,
            created: 0,
            disposed: 0,
            levels: HashMap::new(),
            reject_triggers: false,
        }
    }

    /// A ledger whose output reports as not running, like a device that has
    /// not been resumed yet.
    pub fn suspended() -> Self {
        Self {
            running: false,
            ..Self::new()
        }
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time.max(self.time);
    }

    pub fn advance(&mut self, dt: f64) {
        self.time += dt.max(0.0);
    }

    /// Stop keeping the event list (counters stay accurate). Long simulations
    /// use this to keep memory flat.
    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// Make every subsequent `trigger` fail, to exercise error paths.
    pub fn reject_triggers(&mut self, reject: bool) {
        self.reject_triggers = reject;
    }

    /// Pretend a meter measured `db`.
    pub fn set_level(&mut self, meter: NodeId, db: f32) {
        self.levels.insert(meter, db);
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn disposed_count(&self) -> usize {
        self.disposed
    }

    pub fn live_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn node(&self, id: NodeId) -> Option<&LedgerNode> {
        self.nodes.get(&id)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.spec.kind() == kind)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn param(&self, id: NodeId, param: Param) -> Option<f32> {
        self.nodes.get(&id)?.params.get(&param).copied()
    }

    /// Recorded triggers for one node, in call order.
    pub fn triggers_for(&self, id: NodeId) -> Vec<Trigger> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Triggered { node, trigger } if *node == id => Some(*trigger),
                _ => None,
            })
            .collect()
    }

    /// Recorded ramps for one node and parameter, in call order, as
    /// `(start, duration, target)`.
    pub fn ramps_for(&self, id: NodeId, param: Param) -> Vec<(f64, f64, f32)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Ramp {
                    node,
                    param: p,
                    target,
                    at,
                    duration,
                } if *node == id && *p == param => Some((*at, *duration, *target)),
                _ => None,
            })
            .collect()
    }

    /// Whether audio from `from` can reach `to` through connections.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = Vec::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.outputs.iter().copied());
            }
        }
        false
    }

    fn record(&mut self, event: LedgerEvent) {
        if self.recording {
            self.events.push(event);
        }
    }

    fn live(&self, id: NodeId) -> Result<&LedgerNode, ToolkitError> {
        self.nodes.get(&id).ok_or(ToolkitError::UnknownNode(id))
    }

    fn live_mut(&mut self, id: NodeId) -> Result<&mut LedgerNode, ToolkitError> {
        self.nodes.get_mut(&id).ok_or(ToolkitError::UnknownNode(id))
    }

    fn check_param(&self, id: NodeId, param: Param) -> Result<(), ToolkitError> {
        if self.live(id)?.spec.accepts(param) {
            Ok(())
        } else {
            Err(ToolkitError::InvalidParam { node: id, param })
        }
    }
}

impl Default for LedgerToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioToolkit for LedgerToolkit {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn create(&mut self, spec: NodeSpec) -> Result<NodeId, ToolkitError> {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let params = Param::ALL
            .iter()
            .filter_map(|p| spec.initial(*p).map(|v| (*p, v)))
            .collect();

        self.nodes.insert(
            id,
            LedgerNode {
                spec,
                outputs: Vec::new(),
                modulates: Vec::new(),
                to_output: false,
                running: false,
                params,
                triggers: 0,
            },
        );
        self.created += 1;
        self.record(LedgerEvent::Created {
            node: id,
            kind: spec.kind(),
        });
        Ok(id)
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), ToolkitError> {
        self.live(to)?;
        self.live(from)?;
        if from == to || self.reaches(to, from) {
            return Err(ToolkitError::Cycle { from, to });
        }
        let node = self.live_mut(from)?;
        if !node.outputs.contains(&to) {
            node.outputs.push(to);
        }
        self.record(LedgerEvent::Connected { from, to });
        Ok(())
    }

    fn modulate(
        &mut self,
        source: NodeId,
        target: NodeId,
        param: Param,
    ) -> Result<(), ToolkitError> {
        self.live(source)?;
        self.check_param(target, param)?;
        self.live_mut(source)?.modulates.push((target, param));
        self.record(LedgerEvent::Modulated {
            source,
            target,
            param,
        });
        Ok(())
    }

    fn connect_to_output(&mut self, node: NodeId) -> Result<(), ToolkitError> {
        self.live_mut(node)?.to_output = true;
        self.record(LedgerEvent::RoutedToOutput { node });
        Ok(())
    }

    fn start(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError> {
        self.live_mut(node)?.running = true;
        self.record(LedgerEvent::Started { node, at });
        Ok(())
    }

    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError> {
        self.live_mut(node)?.running = false;
        self.record(LedgerEvent::Stopped { node, at });
        Ok(())
    }

    fn set_param(
        &mut self,
        node: NodeId,
        param: Param,
        value: f32,
        at: f64,
    ) -> Result<(), ToolkitError> {
        self.check_param(node, param)?;
        self.live_mut(node)?.params.insert(param, value);
        self.record(LedgerEvent::Set {
            node,
            param,
            value,
            at,
        });
        Ok(())
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
        self.live_mut(node)?.params.insert(param, target);
        self.record(LedgerEvent::Ramp {
            node,
            param,
            target,
            at,
            duration,
        });
        Ok(())
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
        if self.reject_triggers {
            return Err(ToolkitError::InvalidTrigger("rejected by ledger".into()));
        }
        self.live_mut(node)?.triggers += 1;
        self.record(LedgerEvent::Triggered {
            node,
            trigger: *trigger,
        });
        Ok(())
    }

    fn release(&mut self, node: NodeId, at: f64) -> Result<(), ToolkitError> {
        self.live(node)?;
        self.record(LedgerEvent::Released { node, at });
        Ok(())
    }

    fn level_db(&self, meter: NodeId) -> Option<f32> {
        self.nodes.get(&meter)?;
        Some(self.levels.get(&meter).copied().unwrap_or(-120.0))
    }

    fn dispose(&mut self, node: NodeId) -> Result<(), ToolkitError> {
        self.nodes
            .remove(&node)
            .ok_or(ToolkitError::UnknownNode(node))?;
        for other in self.nodes.values_mut() {
            other.outputs.retain(|o| *o != node);
            other.modulates.retain(|(t, _)| *t != node);
        }
        self.levels.remove(&node);
        self.disposed += 1;
        self.record(LedgerEvent::Disposed { node });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkit::{FilterMode, Waveform};

    #[test]
    fn counts_created_and_disposed_nodes() {
        let mut tk = LedgerToolkit::new();
        let osc = tk.create(NodeSpec::oscillator(Waveform::Sine, 220.0)).unwrap();
        let gain = tk.create(NodeSpec::gain(0.5)).unwrap();
        tk.connect(osc, gain).unwrap();
        assert_eq!(tk.created_count(), 2);

        tk.dispose(osc).unwrap();
        tk.dispose(gain).unwrap();
        assert_eq!(tk.disposed_count(), 2);
        assert_eq!(tk.live_count(), 0);
    }

    #[test]
    fn disposed_nodes_are_rejected_not_panicking() {
        let mut tk = LedgerToolkit::new();
        let gain = tk.create(NodeSpec::gain(1.0)).unwrap();
        tk.dispose(gain).unwrap();

        assert_eq!(tk.dispose(gain), Err(ToolkitError::UnknownNode(gain)));
        assert!(tk.set_param(gain, Param::Gain, 0.2, 0.0).is_err());
        assert_eq!(tk.disposed_count(), 1);
    }

    #[test]
    fn rejects_cycles() {
        let mut tk = LedgerToolkit::new();
        let a = tk.create(NodeSpec::gain(1.0)).unwrap();
        let b = tk.create(NodeSpec::gain(1.0)).unwrap();
        tk.connect(a, b).unwrap();
        assert!(matches!(tk.connect(b, a), Err(ToolkitError::Cycle { .. })));
        assert!(tk.reaches(a, b));
    }

    #[test]
    fn tracks_parameter_targets() {
        let mut tk = LedgerToolkit::new();
        let f = tk
            .create(NodeSpec::filter(FilterMode::LowPass, 1000.0, 0.7))
            .unwrap();
        assert_eq!(tk.param(f, Param::Frequency), Some(1000.0));
        tk.ramp_param(f, Param::Frequency, 400.0, 1.0, 2.0).unwrap();
        assert_eq!(tk.param(f, Param::Frequency), Some(400.0));
        assert_eq!(tk.ramps_for(f, Param::Frequency), vec![(1.0, 2.0, 400.0)]);
        assert!(tk.set_param(f, Param::Wet, 0.5, 0.0).is_err());
    }

    #[test]
    fn trigger_requires_triggerable_node() {
        let mut tk = LedgerToolkit::new();
        let gain = tk.create(NodeSpec::gain(1.0)).unwrap();
        assert!(tk.trigger(gain, &Trigger::gate(0.1, 0.0)).is_err());

        let env = tk
            .create(NodeSpec::Envelope(crate::toolkit::Adsr::new(0.01, 0.1, 0.0, 0.1)))
            .unwrap();
        tk.trigger(env, &Trigger::gate(0.1, 0.5)).unwrap();
        assert_eq!(tk.triggers_for(env).len(), 1);

        tk.reject_triggers(true);
        assert!(tk.trigger(env, &Trigger::gate(0.1, 0.6)).is_err());
    }
}
