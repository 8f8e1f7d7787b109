//! The start/stop/resume control collaborator.
//!
//! A host UI owns the play/pause bookkeeping. The engine registers nothing
//! with it directly; instead it drains the actions the surface has queued
//! (`Engine::service`) and reports back whether each one succeeded.

use std::collections::VecDeque;

/// Commands a control surface can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Resume,
}

/// What the surface believes about playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceState {
    pub is_playing: bool,
    /// Set once audio has successfully started at least once.
    pub audio_started: bool,
}

pub trait ControlSurface {
    fn state(&self) -> SurfaceState;

    /// Next queued action, if any.
    fn poll_action(&mut self) -> Option<ControlAction>;

    /// Called after the engine handled `action`. `ok` is false when the
    /// action failed (for example the output was not running).
    fn on_handled(&mut self, action: ControlAction, ok: bool);
}

/// Queue-backed surface used by the terminal UI and by tests.
#[derive(Debug, Default)]
pub struct ControlPanel {
    state: SurfaceState,
    pending: VecDeque<ControlAction>,
    failures: usize,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, action: ControlAction) {
        self.pending.push_back(action);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Actions that were reported as failed since creation.
    pub fn failures(&self) -> usize {
        self.failures
    }
}

impl ControlSurface for ControlPanel {
    fn state(&self) -> SurfaceState {
        self.state
    }

    fn poll_action(&mut self) -> Option<ControlAction> {
        self.pending.pop_front()
    }

    fn on_handled(&mut self, action: ControlAction, ok: bool) {
        if !ok {
            self.failures += 1;
            return;
        }
        match action {
            ControlAction::Start | ControlAction::Resume => {
                self.state.is_playing = true;
                self.state.audio_started = true;
            }
            ControlAction::Stop => self.state.is_playing = false,
        }
    }
}
