//! Engine configuration.
//!
//! * Looks for the file named by `AMBIENT_DRIFT_CONFIG`, then
//!   `ambient_drift.toml` in the working directory, unless a path is given.
//! * Every field has a default, so the file and each table in it are
//!   optional. A broken file is reported and ignored.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::rhythm::RhythmTuning;

pub const CONFIG_ENV: &str = "AMBIENT_DRIFT_CONFIG";
pub const CONFIG_FILE: &str = "ambient_drift.toml";

/// The four generative layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Drone,
    Bell,
    Static,
    Choir,
}

impl LayerKind {
    pub const ALL: [LayerKind; 4] = [
        LayerKind::Drone,
        LayerKind::Bell,
        LayerKind::Static,
        LayerKind::Choir,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Drone => "drone",
            LayerKind::Bell => "bell",
            LayerKind::Static => "static",
            LayerKind::Choir => "choir",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drone" => Ok(LayerKind::Drone),
            "bell" => Ok(LayerKind::Bell),
            "static" => Ok(LayerKind::Static),
            "choir" => Ok(LayerKind::Choir),
            _ => Err(EngineError::UnknownLayer(s.to_string())),
        }
    }
}

/// Per-layer switch and level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioLayerConfig {
    pub enabled: bool,
    pub volume_db: f32,
}

impl AudioLayerConfig {
    pub fn new(enabled: bool, volume_db: f32) -> Self {
        Self { enabled, volume_db }
    }
}

impl Default for AudioLayerConfig {
    fn default() -> Self {
        Self::new(true, -18.0)
    }
}

/// Configuration of all four layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub drone: AudioLayerConfig,
    pub bell: AudioLayerConfig,
    #[serde(rename = "static")]
    pub static_noise: AudioLayerConfig,
    pub choir: AudioLayerConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            drone: AudioLayerConfig::new(true, -14.0),
            bell: AudioLayerConfig::new(true, -18.0),
            static_noise: AudioLayerConfig::new(true, -24.0),
            choir: AudioLayerConfig::new(true, -20.0),
        }
    }
}

impl AudioConfig {
    pub fn get(&self, layer: LayerKind) -> &AudioLayerConfig {
        match layer {
            LayerKind::Drone => &self.drone,
            LayerKind::Bell => &self.bell,
            LayerKind::Static => &self.static_noise,
            LayerKind::Choir => &self.choir,
        }
    }

    pub fn get_mut(&mut self, layer: LayerKind) -> &mut AudioLayerConfig {
        match layer {
            LayerKind::Drone => &mut self.drone,
            LayerKind::Bell => &mut self.bell,
            LayerKind::Static => &mut self.static_noise,
            LayerKind::Choir => &mut self.choir,
        }
    }

    pub fn enabled_layers(&self) -> impl Iterator<Item = LayerKind> + '_ {
        LayerKind::ALL
            .into_iter()
            .filter(move |layer| self.get(*layer).enabled)
    }
}

/// Bounds and timing for the drifting tempo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoSettings {
    pub base_bpm: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Transition length range in seconds, `[low, high]`.
    pub ramp_secs: [f64; 2],
    /// Hold after each transition, `[low, high]` seconds.
    pub hold_secs: [f64; 2],
    /// How fast tempo returns to `base_bpm` on stop.
    pub stop_ramp_secs: f64,
}

impl Default for TempoSettings {
    fn default() -> Self {
        Self {
            base_bpm: 72.0,
            min_bpm: 60.0,
            max_bpm: 96.0,
            ramp_secs: [8.0, 30.0],
            hold_secs: [10.0, 40.0],
            stop_ramp_secs: 2.0,
        }
    }
}

impl TempoSettings {
    /// Repair inverted or out-of-range values instead of rejecting them.
    pub fn sanitized(mut self) -> Self {
        if self.min_bpm > self.max_bpm {
            std::mem::swap(&mut self.min_bpm, &mut self.max_bpm);
        }
        self.min_bpm = self.min_bpm.max(1.0);
        self.max_bpm = self.max_bpm.max(self.min_bpm);
        self.base_bpm = self.base_bpm.clamp(self.min_bpm, self.max_bpm);
        for range in [&mut self.ramp_secs, &mut self.hold_secs] {
            range[0] = range[0].max(0.0);
            range[1] = range[1].max(0.0);
            if range[1] < range[0] {
                range.swap(0, 1);
            }
        }
        self.stop_ramp_secs = self.stop_ramp_secs.max(0.0);
        self
    }
}

/// How the static layer reaches the master bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Routing {
    /// The voice routes its own dry/wet mix to the master bus.
    Free,
    /// The voice exposes its pre-effects tap for the rhythm engine's gate.
    #[default]
    Engine,
}

/// Master bus diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSettings {
    pub warn_db: f32,
    pub interval_secs: f64,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            warn_db: -3.0,
            interval_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Fixed seed. A clock-derived seed is used when absent.
    pub seed: Option<u32>,
    /// How far ahead of the output clock cues are fired.
    pub lookahead_secs: f64,
    pub layers: AudioConfig,
    pub tempo: TempoSettings,
    pub static_routing: Routing,
    pub meter: MeterSettings,
    pub rhythm: RhythmTuning,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            seed: None,
            lookahead_secs: 0.1,
            layers: AudioConfig::default(),
            tempo: TempoSettings::default(),
            static_routing: Routing::default(),
            meter: MeterSettings::default(),
            rhythm: RhythmTuning::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut settings: EngineSettings = toml::from_str(text)?;
        settings.tempo = settings.tempo.sanitized();
        settings.lookahead_secs = settings.lookahead_secs.clamp(0.0, 2.0);
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Where settings are looked up when no explicit path is given.
    pub fn default_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
            Some(path) if path.exists() => path,
            _ => PathBuf::from(CONFIG_FILE),
        }
    }

    /// Load settings, falling back to defaults on any error.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match Self::read(&path) {
            Ok(settings) => {
                info!(path = %path.display(), "loaded configuration");
                settings
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not load configuration, using defaults");
                Self::default()
            }
        }
    }
}
