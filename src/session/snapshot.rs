// src/session/snapshot.rs

use serde::Serialize;

use super::{SessionId, SessionState};
use crate::decoder::SourceRef;
use crate::error::LoadError;
use crate::waveform::Waveform;

/// Why a load ended in `Failed`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionError {
    pub kind: &'static str,
    pub message: String,
}

impl From<&LoadError> for SessionError {
    fn from(e: &LoadError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Read-only copy of a session's observable state, taken at poll time.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub source: SourceRef,
    pub state: SessionState,
    pub waveform: Option<Waveform>,
    pub bpm: f64,
    /// `false` with a loaded track means "unknown tempo", not a failure.
    pub tempo_detected: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub remaining_seconds: f64,
    pub pitch_semitones: f64,
    pub rate: f64,
    pub error: Option<SessionError>,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// `mm:ss / mm:ss` transport readout.
    pub fn time_label(&self) -> String {
        format!(
            "{} / {}",
            format_clock(self.position_seconds),
            format_clock(self.duration_seconds)
        )
    }

    pub fn tempo_label(&self) -> String {
        if self.tempo_detected {
            format!("{:5.1} BPM", self.bpm)
        } else if self.state.is_loaded() {
            "  ?   BPM".to_string()
        } else {
            "  -   BPM".to_string()
        }
    }
}

pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: SessionState, bpm: f64) -> SessionSnapshot {
        SessionSnapshot {
            id: SessionId(3),
            source: SourceRef::from("song.flac"),
            state,
            waveform: None,
            bpm,
            tempo_detected: bpm > 0.0,
            position_seconds: 65.4,
            duration_seconds: 180.0,
            remaining_seconds: 114.6,
            pitch_semitones: 0.0,
            rate: 1.0,
            error: None,
        }
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(65.9), "01:05");
        assert_eq!(format_clock(-1.0), "00:00");
        assert_eq!(snapshot(SessionState::Playing, 0.0).time_label(), "01:05 / 03:00");
    }

    #[test]
    fn tempo_label_distinguishes_unknown_from_unloaded() {
        assert_eq!(snapshot(SessionState::Stopped, 128.0).tempo_label(), "128.0 BPM");
        assert_eq!(snapshot(SessionState::Stopped, 0.0).tempo_label(), "  ?   BPM");
        assert_eq!(snapshot(SessionState::Loading, 0.0).tempo_label(), "  -   BPM");
    }

    #[test]
    fn serializes_state_in_snake_case() {
        let json = snapshot(SessionState::Paused, 90.0).to_json().unwrap();
        assert!(json.contains(r#""state":"paused""#), "{json}");
        assert!(json.contains(r#""source":"song.flac""#), "{json}");
        assert!(json.contains(r#""id":3"#), "{json}");
    }
}
