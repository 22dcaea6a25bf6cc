// src/controller.rs

use std::fmt::Write as FmtWrite;
use std::io::{stdout, Write};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyModifiers};
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate},
};

use crate::registry::SessionRegistry;
use crate::session::snapshot::SessionSnapshot;
use crate::session::{SessionId, SessionState};
use crate::waveform::terminal::{fit_columns, render_ascii};

const GRID_COLUMNS: usize = 100;
const GRID_HEIGHT: usize = 16;
const SEEK_STEP_SECONDS: f64 = 5.0;

/// Mirrored waveform for a snapshot, with the playhead marked when a track is loaded.
pub fn waveform_strip(snap: &SessionSnapshot, columns: usize, height: usize) -> Vec<String> {
    let Some(waveform) = &snap.waveform else {
        return Vec::new();
    };
    let points = fit_columns(waveform.points(), columns);
    let playhead = if snap.duration_seconds > 0.0 && !points.is_empty() {
        let frac = (snap.position_seconds / snap.duration_seconds).clamp(0.0, 1.0);
        Some(((frac * points.len() as f64) as usize).min(points.len() - 1))
    } else {
        None
    };
    render_ascii(&points, height, playhead)
}

/// One-line summary: state, clock, tempo, pitch.
pub fn status_line(snap: &SessionSnapshot) -> String {
    let mut line = format!(
        "{} [{}] {} | {}",
        snap.source,
        snap.state,
        snap.time_label(),
        snap.tempo_label()
    );
    if snap.state.is_loaded() {
        let _ = write!(line, " | pitch {:+.0} st (x{:.3})", snap.pitch_semitones, snap.rate);
    }
    if let Some(err) = &snap.error {
        let _ = write!(line, " | {}: {}", err.kind, err.message);
    }
    line
}

/// Drives a single session from the keyboard and redraws it in place.
pub struct PlayerController {
    registry: SessionRegistry,
    session: SessionId,

    cached_position_secs: u64,
    cached_playhead_col: Option<usize>,
    cached_state: Option<SessionState>,
    cached_pitch: f64,
    force_redraw: bool,

    draw_buffer: String,
}

impl PlayerController {
    pub fn new(mut registry: SessionRegistry, source: &str) -> Self {
        let session = registry.add(source);
        Self {
            registry,
            session,
            cached_position_secs: u64::MAX,
            cached_playhead_col: None,
            cached_state: None,
            cached_pitch: 0.0,
            force_redraw: true,
            draw_buffer: String::with_capacity(4096),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Redraw cadence, from the engine config.
    pub fn poll_interval(&self) -> Duration {
        self.registry.config().poll_interval()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.registry.session(self.session).map(|s| s.snapshot())
    }

    pub fn run_tick(&mut self) -> Result<(), anyhow::Error> {
        // 1. Commit finished loads and end-of-track
        self.registry.update();

        let Some(snap) = self.snapshot() else {
            return Ok(());
        };
        let strip = waveform_strip(&snap, GRID_COLUMNS, GRID_HEIGHT);
        let playhead_col = strip
            .first()
            .and_then(|row| row.chars().position(|c| c == '┃'));

        // 2. Dirty check
        let pos_secs = snap.position_seconds as u64;
        let changed = pos_secs != self.cached_position_secs
            || playhead_col != self.cached_playhead_col
            || Some(snap.state) != self.cached_state
            || snap.pitch_semitones != self.cached_pitch;
        if !changed && !self.force_redraw {
            return Ok(());
        }
        self.cached_position_secs = pos_secs;
        self.cached_playhead_col = playhead_col;
        self.cached_state = Some(snap.state);
        self.cached_pitch = snap.pitch_semitones;
        self.force_redraw = false;

        // 3. Build output buffer
        self.draw_buffer.clear();
        let _ = write!(self.draw_buffer, "{}", MoveTo(0, 0));
        for line in &strip {
            let _ = write!(self.draw_buffer, "{}\x1b[K\r\n", line);
        }
        let _ = write!(self.draw_buffer, "{}", MoveTo(0, GRID_HEIGHT as u16 + 1));
        let _ = write!(self.draw_buffer, "{}", Clear(ClearType::UntilNewLine));
        let _ = write!(self.draw_buffer, "{}", status_line(&snap));

        // 4. Flush to terminal
        let mut stdout = stdout();
        execute!(stdout, BeginSynchronizedUpdate)?;
        stdout.write_all(self.draw_buffer.as_bytes())?;
        execute!(stdout, EndSynchronizedUpdate)?;
        stdout.flush()?;

        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        let id = self.session;
        let applied = match key {
            KeyCode::Char(' ') => self.registry.toggle_playback(id),
            KeyCode::Char('s') | KeyCode::Char('S') => self.registry.stop(id),
            KeyCode::Right => self.registry.seek_by(id, SEEK_STEP_SECONDS),
            KeyCode::Left => self.registry.seek_by(id, -SEEK_STEP_SECONDS),
            KeyCode::Up => self.registry.change_pitch(id, 1.0),
            KeyCode::Down => self.registry.change_pitch(id, -1.0),
            KeyCode::Char('0') => self.registry.reset_pitch(id),
            KeyCode::Char('r') | KeyCode::Char('R') => self.registry.reload(id),
            _ => false,
        };
        if applied {
            self.force_redraw = true;
        }
    }

    pub fn should_quit(&self, key: KeyCode, modifiers: KeyModifiers) -> bool {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
            KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
            _ => false,
        }
    }
}
