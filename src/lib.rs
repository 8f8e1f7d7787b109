//! Generative ambient audio engine.
//!
//! Four layers (drone, bell, choir, static) driven by a seeded generator,
//! a drifting tempo and a Euclidean rhythm engine, all scheduled on one
//! cooperative clock and mixed through a fixed master bus.

pub mod config;
pub mod control;
pub mod cue;
pub mod dsp; // Sample-level primitives
pub mod error;
pub mod harmony;
pub mod master;
pub mod orchestrator;
pub mod random;
pub mod render; // Realtime toolkit and device output
pub mod rhythm;
pub mod toolkit; // Audio primitive interface
pub mod transport;
pub mod voices;

pub use config::{AudioConfig, AudioLayerConfig, EngineSettings, LayerKind, Routing};
pub use control::{ControlAction, ControlPanel, ControlSurface, SurfaceState};
pub use error::{EngineError, Result};
pub use orchestrator::{Engine, EngineSnapshot};
pub use random::Rng;
pub use toolkit::{AudioToolkit, LedgerToolkit};
