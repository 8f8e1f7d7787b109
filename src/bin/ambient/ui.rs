//! Terminal control surface.
//!
//! Keys queue actions on a `ControlPanel`; the engine drains them on the next
//! tick and the panel keeps the play/pause bookkeeping.

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    DefaultTerminal, Frame,
};

use ambient_drift::render::{OutputHost, RenderToolkit};
use ambient_drift::{
    AudioConfig, ControlAction, ControlPanel, ControlSurface, Engine, EngineSnapshot, LayerKind,
};

use super::app::{tick, PUMP_INTERVAL};

/// Meter floor for the level gauge, dBFS.
const METER_FLOOR_DB: f32 = -60.0;

pub struct UiApp {
    panel: ControlPanel,
    device: String,
    sample_rate: u32,
    channels: u16,
    should_quit: bool,
}

impl UiApp {
    pub fn new(host: &OutputHost) -> Self {
        let mut panel = ControlPanel::new();
        panel.press(ControlAction::Start);
        Self {
            panel,
            device: host.device_name().to_string(),
            sample_rate: host.sample_rate(),
            channels: host.channels(),
            should_quit: false,
        }
    }

    pub fn run(
        &mut self,
        terminal: &mut DefaultTerminal,
        engine: &mut Engine<RenderToolkit>,
    ) -> EyreResult<()> {
        while !self.should_quit {
            tick(engine, &mut self.panel);

            let snapshot = engine.snapshot();
            let config = engine.audio_config();
            let triggers = engine.trigger_counts();
            terminal.draw(|frame| self.render(frame, &snapshot, &config, &triggers))?;

            if event::poll(PUMP_INTERVAL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('s') | KeyCode::Char('S') => self.panel.press(ControlAction::Start),
            KeyCode::Char('x') | KeyCode::Char('X') => self.panel.press(ControlAction::Stop),
            KeyCode::Char('r') | KeyCode::Char('R') => self.panel.press(ControlAction::Resume),
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }

    fn render(
        &self,
        frame: &mut Frame,
        snapshot: &EngineSnapshot,
        config: &AudioConfig,
        triggers: &[u64; 4],
    ) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Transport
                Constraint::Length(6), // Layers
                Constraint::Length(5), // Static engine
                Constraint::Length(3), // Meter
                Constraint::Min(0),
                Constraint::Length(1), // Help
            ])
            .split(frame.area());

        self.render_transport(frame, chunks[0], snapshot);
        render_layers(frame, chunks[1], snapshot, config, triggers);
        render_rhythm(frame, chunks[2], snapshot);
        render_meter(frame, chunks[3], snapshot.level_db);

        let help = Paragraph::new(" [S] Start  [X] Stop  [R] Resume  [Q] Quit")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, chunks[5]);
    }

    fn render_transport(&self, frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot) {
        let state = self.panel.state();
        let (symbol, label, color) = if snapshot.playing {
            ("▶", "Playing", Color::Green)
        } else if state.audio_started {
            ("⏸", "Stopped", Color::Yellow)
        } else {
            ("■", "Idle", Color::DarkGray)
        };

        let line = Line::from(vec![
            Span::styled(
                format!(" BPM: {:.1}  ", snapshot.tempo_bpm),
                Style::default().fg(Color::Cyan),
            ),
            Span::styled(format!("{symbol} {label}  "), Style::default().fg(color)),
            Span::styled(
                format!("Seed: {}  ", snapshot.seed),
                Style::default().fg(Color::White),
            ),
            Span::styled(
                format!("{:.0}s  ", snapshot.time),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(
                format!(
                    "{} {:.1}kHz {}ch",
                    self.device,
                    self.sample_rate as f32 / 1000.0,
                    self.channels
                ),
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        let block = Block::default().title(" ambient ").borders(Borders::ALL);
        frame.render_widget(Paragraph::new(line).block(block), area);
    }
}

fn render_layers(
    frame: &mut Frame,
    area: Rect,
    snapshot: &EngineSnapshot,
    config: &AudioConfig,
    triggers: &[u64; 4],
) {
    let lines: Vec<Line> = LayerKind::ALL
        .iter()
        .zip(triggers)
        .map(|(layer, count)| {
            let layer_config = config.get(*layer);
            let (status, color) = match (snapshot.layers.contains(layer), layer_config.enabled) {
                (true, true) => ("live", Color::Green),
                (true, false) => ("muted", Color::Yellow),
                (false, true) => ("pending", Color::DarkGray),
                (false, false) => ("off", Color::DarkGray),
            };
            Line::from(vec![
                Span::styled(format!(" {:<8}", layer.name()), Style::default().fg(Color::White)),
                Span::styled(format!("{status:<8}"), Style::default().fg(color)),
                Span::styled(
                    format!("{:>6.1} dB  ", layer_config.volume_db),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(format!("{count} triggers"), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let block = Block::default().title(" Layers ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_rhythm(frame: &mut Frame, area: Rect, snapshot: &EngineSnapshot) {
    let lines = match snapshot.rhythm {
        Some(stats) => vec![
            Line::from(vec![
                Span::styled(" Scene: ", Style::default().fg(Color::DarkGray)),
                Span::styled(
                    snapshot.scene.unwrap_or("-").to_string(),
                    Style::default().fg(Color::Magenta),
                ),
                Span::styled("  Density: ", Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("{:.2}", snapshot.density.unwrap_or(0.0)),
                    Style::default().fg(Color::Magenta),
                ),
            ]),
            Line::from(format!(
                " Hits {}  sounded {}  sprinkles {}",
                stats.hits, stats.sounded, stats.sprinkles
            )),
            Line::from(format!(
                " Windows {}  window bursts {}",
                stats.windows, stats.window_bursts
            )),
        ],
        None => vec![Line::from(" (free routing or static layer off)")],
    };
    let block = Block::default().title(" Static engine ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_meter(frame: &mut Frame, area: Rect, level_db: Option<f32>) {
    let db = level_db.unwrap_or(METER_FLOOR_DB).max(METER_FLOOR_DB);
    let ratio = ((db - METER_FLOOR_DB) / -METER_FLOOR_DB).clamp(0.0, 1.0) as f64;
    let color = if db > -3.0 {
        Color::Red
    } else if db > -12.0 {
        Color::Yellow
    } else {
        Color::Green
    };
    let label = match level_db {
        Some(db) => format!("{db:.1} dBFS"),
        None => "-".to_string(),
    };
    let gauge = Gauge::default()
        .block(Block::default().title(" Master ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(color))
        .ratio(ratio)
        .label(label);
    frame.render_widget(gauge, area);
}
