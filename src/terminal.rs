// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-status dashboard: a ratatui/crossterm terminal view of a running
//! [`gatevision::Orchestrator`], replacing the teacher's PipeWire camera
//! viewer (`FrameWidget` rendering half-block pixels) with a gauge/table
//! view over the same `Observer` fan-out the orchestrator already uses.

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use gatevision::events::{DetectorResultSummary, Observer, PipelineEvent};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Terminal,
};
use std::io::{self, stdout};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The latest snapshot of pipeline state the dashboard renders, updated by
/// a [`DashboardObserver`] registered on the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct DashboardSnapshot {
    pub sequence: u64,
    pub fps: f32,
    pub crossing_count: u64,
    pub defect_count: usize,
    pub pass_rate: f32,
    pub packaging_mode: String,
    pub packaging_current: u32,
    pub packaging_target: u32,
    pub method_changes: u64,
}

/// An [`Observer`] that keeps [`DashboardSnapshot`] current; clone the
/// handle to hand one half to the orchestrator and keep the other for the
/// render loop; observers are passive, fanned out in registration order.
#[derive(Clone)]
pub struct DashboardObserver {
    snapshot: Arc<Mutex<DashboardSnapshot>>,
}

impl DashboardObserver {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(DashboardSnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.snapshot.lock().expect("dashboard snapshot mutex poisoned").clone()
    }
}

impl Default for DashboardObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for DashboardObserver {
    fn on_event(&mut self, event: &PipelineEvent) -> Result<(), String> {
        let mut snapshot = self.snapshot.lock().map_err(|_| "dashboard snapshot mutex poisoned".to_string())?;
        match event {
            PipelineEvent::FrameProcessed(frame) => {
                snapshot.sequence = frame.sequence;
                snapshot.fps = frame.fps;
                match &frame.detector_results {
                    DetectorResultSummary::Counting { crossing_count, .. } => {
                        snapshot.crossing_count = *crossing_count;
                    }
                    DetectorResultSummary::Defect {
                        defect_count, pass_rate, ..
                    } => {
                        snapshot.defect_count = *defect_count;
                        snapshot.pass_rate = *pass_rate;
                    }
                }
            }
            PipelineEvent::PackagingStateChanged(state) => {
                snapshot.packaging_mode = format!("{:?}", state.mode);
                snapshot.packaging_current = state.current;
                snapshot.packaging_target = state.target;
            }
            PipelineEvent::MethodChanged(_) => {
                snapshot.method_changes += 1;
            }
            PipelineEvent::GateCrossing(_) | PipelineEvent::PackagingComplete(_) => {}
        }
        Ok(())
    }
}

/// Run the dashboard against `snapshot`, polling at roughly the terminal's
/// refresh cadence until `q` is pressed. The orchestrator's own tick loop
/// runs on the caller's thread or another one; this function only renders.
pub fn run(snapshot: DashboardObserver) -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, snapshot);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    snapshot: DashboardObserver,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let state = snapshot.snapshot();

        terminal.draw(|f| {
            let area = f.area();
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Length(3),
                    Constraint::Length(3),
                    Constraint::Min(0),
                ])
                .split(area);

            let header = Paragraph::new(Line::from(vec![
                Span::styled("gatevision", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(format!("  frame #{}  {:.1} fps", state.sequence, state.fps)),
            ]))
            .block(Block::default().borders(Borders::ALL).title("pipeline"));
            f.render_widget(header, rows[0]);

            let count_line = Paragraph::new(format!(
                "crossing_count = {}   defects this frame = {}   pass_rate = {:.2}",
                state.crossing_count, state.defect_count, state.pass_rate
            ))
            .block(Block::default().borders(Borders::ALL).title("detector"));
            f.render_widget(count_line, rows[1]);

            let ratio = if state.packaging_target == 0 {
                0.0
            } else {
                (state.packaging_current as f64 / state.packaging_target as f64).min(1.0)
            };
            let color = match state.packaging_mode.as_str() {
                "Complete" => Color::Green,
                "Running" => Color::Yellow,
                "Paused" => Color::Red,
                _ => Color::Gray,
            };
            let gauge = Gauge::default()
                .block(Block::default().borders(Borders::ALL).title(format!(
                    "packaging: {} ({}/{})",
                    state.packaging_mode, state.packaging_current, state.packaging_target
                )))
                .gauge_style(Style::default().fg(color))
                .ratio(ratio);
            f.render_widget(gauge, rows[2]);

            let footer = Paragraph::new(format!(
                "method switches: {}   press 'q' to exit the dashboard",
                state.method_changes
            ))
            .block(Block::default().borders(Borders::ALL).title("status"));
            f.render_widget(footer, rows[3]);
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') {
                    return Ok(());
                }
            }
        }
    }
}
