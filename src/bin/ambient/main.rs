//! ambient - generative ambient audio in the terminal
//!
//! Run with: cargo run --bin ambient -- play

mod app;
mod ui;

use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result as EyreResult, WrapErr};
use tracing_subscriber::EnvFilter;

use ambient_drift::{EngineSettings, LayerKind};

/// Log file used while the terminal UI owns the screen.
const LOG_FILE: &str = "ambient.log";

#[derive(Parser)]
#[command(name = "ambient")]
#[command(about = "Generative ambient soundscapes", version, long_about = None)]
struct Cli {
    /// Fixed seed (a clock-derived one is used otherwise)
    #[arg(short, long, global = true)]
    seed: Option<u32>,

    /// Configuration file (defaults to $AMBIENT_DRIFT_CONFIG or ./ambient_drift.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Lower tempo bound
    #[arg(long, global = true)]
    bpm_min: Option<f64>,

    /// Upper tempo bound
    #[arg(long, global = true)]
    bpm_max: Option<f64>,

    /// Layers to leave out (repeatable)
    #[arg(short, long, global = true)]
    disable: Vec<LayerKind>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Play through the default output device
    Play {
        /// Run without the terminal UI
        #[arg(long)]
        headless: bool,

        /// Stop after this many seconds (headless only)
        #[arg(short, long)]
        duration: Option<f64>,
    },
    /// Run the engine against the recording toolkit and print a summary
    Simulate {
        /// Simulated seconds
        #[arg(short = 'n', long, default_value = "120")]
        seconds: f64,

        /// Clock step in seconds
        #[arg(long, default_value = "0.05")]
        step: f64,
    },
    /// List output devices
    Info,
}

impl Cli {
    fn settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::load(self.config.as_deref());
        if let Some(seed) = self.seed {
            settings.seed = Some(seed);
        }
        if let Some(min) = self.bpm_min {
            settings.tempo.min_bpm = min;
        }
        if let Some(max) = self.bpm_max {
            settings.tempo.max_bpm = max;
        }
        settings.tempo = settings.tempo.sanitized();
        for layer in &self.disable {
            settings.layers.get_mut(*layer).enabled = false;
        }
        settings
    }
}

fn init_logging(to_file: bool) -> EyreResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if to_file {
        let file = std::fs::File::create(LOG_FILE)
            .wrap_err_with(|| format!("failed to create {LOG_FILE}"))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    let mut cli = Cli::parse();

    let command = cli.command.take().unwrap_or(Command::Play {
        headless: false,
        duration: None,
    });
    let tui = matches!(command, Command::Play { headless: false, .. });
    init_logging(tui)?;

    let settings = cli.settings();
    match command {
        Command::Play { headless, duration } => app::play(settings, headless, duration),
        Command::Simulate { seconds, step } => app::simulate(settings, seconds, step),
        Command::Info => app::info(),
    }
}
