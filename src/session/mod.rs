// src/session/mod.rs

pub mod sink;
pub mod snapshot;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::analyzer::AnalyzedTrack;
use crate::bpm::TempoEstimate;
use crate::buffer::SampleBuffer;
use crate::decoder::SourceRef;
use crate::error::LoadError;
use crate::waveform::Waveform;
use sink::PlaybackSink;
use snapshot::{SessionError, SessionSnapshot};

/// Identifier for a session, unique within its registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unloaded,
    Loading,
    Stopped,
    Playing,
    Paused,
    Failed,
    Destroyed,
}

impl SessionState {
    pub fn is_loaded(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Playing | SessionState::Paused)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unloaded => "Unloaded",
            SessionState::Loading => "Loading",
            SessionState::Stopped => "Stopped",
            SessionState::Playing => "Playing",
            SessionState::Paused => "Paused",
            SessionState::Failed => "Failed",
            SessionState::Destroyed => "Destroyed",
        };
        f.write_str(s)
    }
}

/// Pitch offset in semitones → playback rate multiplier.
#[inline]
pub fn semitones_to_rate(semitones: f64) -> f64 {
    2f64.powf(semitones / 12.0)
}

struct LoadedTrack {
    buffer: Arc<SampleBuffer>,
    waveform: Waveform,
    tempo: TempoEstimate,
    sink: Box<dyn PlaybackSink>,
}

/// Transport and analysis state for one track.
///
/// All transitions go through the methods below. A call that is not valid
/// in the current state changes nothing and returns `false`; double clicks
/// and similar UI races are expected and harmless.
pub struct PlaybackSession {
    id: SessionId,
    source: SourceRef,
    state: SessionState,
    track: Option<LoadedTrack>,
    error: Option<SessionError>,
    pitch_semitones: f64,
}

impl PlaybackSession {
    pub fn new(id: SessionId, source: SourceRef) -> Self {
        Self {
            id,
            source,
            state: SessionState::Unloaded,
            track: None,
            error: None,
            pitch_semitones: 0.0,
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffer(&self) -> Option<&Arc<SampleBuffer>> {
        self.track.as_ref().map(|t| &t.buffer)
    }

    pub fn waveform(&self) -> Option<&Waveform> {
        self.track.as_ref().map(|t| &t.waveform)
    }

    pub fn tempo(&self) -> TempoEstimate {
        self.track.as_ref().map(|t| t.tempo).unwrap_or(TempoEstimate::UNKNOWN)
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn pitch_semitones(&self) -> f64 {
        self.pitch_semitones
    }

    pub fn rate(&self) -> f64 {
        semitones_to_rate(self.pitch_semitones)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.track.as_ref().map(|t| t.buffer.duration_seconds()).unwrap_or(0.0)
    }

    /// Sink playhead, kept inside `[0, duration]`.
    pub fn position_seconds(&self) -> f64 {
        match &self.track {
            Some(t) => {
                let pos = t.sink.position();
                if pos.is_finite() { pos.clamp(0.0, t.buffer.duration_seconds()) } else { 0.0 }
            }
            None => 0.0,
        }
    }

    pub fn remaining_seconds(&self) -> f64 {
        (self.duration_seconds() - self.position_seconds()).max(0.0)
    }

    // --- Load lifecycle ---

    pub fn begin_load(&mut self) -> bool {
        if self.state != SessionState::Unloaded {
            return self.reject("begin_load");
        }
        self.state = SessionState::Loading;
        true
    }

    pub fn load_succeeded(&mut self, loaded: AnalyzedTrack, mut sink: Box<dyn PlaybackSink>) -> bool {
        if self.state != SessionState::Loading {
            return self.reject("load_succeeded");
        }
        sink.set_rate(self.rate());
        sink.set_position(0.0);
        self.track = Some(LoadedTrack {
            buffer: loaded.buffer,
            waveform: loaded.waveform,
            tempo: loaded.tempo,
            sink,
        });
        self.error = None;
        self.state = SessionState::Stopped;
        true
    }

    pub fn load_failed(&mut self, error: LoadError) -> bool {
        if self.state != SessionState::Loading {
            return self.reject("load_failed");
        }
        self.error = Some(SessionError::from(&error));
        self.state = SessionState::Failed;
        true
    }

    /// Drop loaded audio and go back to `Unloaded` so the track can be loaded again.
    /// `Failed` and `Destroyed` are terminal and stay put.
    pub fn unload(&mut self) -> bool {
        if matches!(self.state, SessionState::Failed | SessionState::Destroyed) {
            return self.reject("unload");
        }
        self.release();
        self.state = SessionState::Unloaded;
        true
    }

    /// Release buffer, waveform and sink. Terminal.
    pub fn destroy(&mut self) {
        self.release();
        self.state = SessionState::Destroyed;
    }

    fn release(&mut self) {
        if let Some(mut track) = self.track.take() {
            track.sink.stop();
        }
    }

    // --- Transport ---

    pub fn play(&mut self) -> bool {
        if !matches!(self.state, SessionState::Stopped | SessionState::Paused) {
            return self.reject("play");
        }
        let rate = self.rate();
        let Some(track) = self.track.as_mut() else { return false };
        track.sink.set_rate(rate);
        track.sink.play();
        self.state = SessionState::Playing;
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != SessionState::Playing {
            return self.reject("pause");
        }
        let Some(track) = self.track.as_mut() else { return false };
        track.sink.pause();
        self.state = SessionState::Paused;
        true
    }

    pub fn stop(&mut self) -> bool {
        if !matches!(self.state, SessionState::Playing | SessionState::Paused) {
            return self.reject("stop");
        }
        let Some(track) = self.track.as_mut() else { return false };
        track.sink.stop();
        track.sink.set_position(0.0);
        self.state = SessionState::Stopped;
        true
    }

    pub fn toggle_playback(&mut self) -> bool {
        if self.state == SessionState::Playing { self.pause() } else { self.play() }
    }

    /// Absolute seek, clamped into `[0, duration]`.
    pub fn seek(&mut self, target_seconds: f64) -> bool {
        if !self.state.is_loaded() || target_seconds.is_nan() {
            return self.reject("seek");
        }
        let Some(track) = self.track.as_mut() else { return false };
        let clamped = target_seconds.clamp(0.0, track.buffer.duration_seconds());
        track.sink.set_position(clamped);
        true
    }

    /// Relative seek in seconds (signed).
    pub fn seek_by(&mut self, delta_seconds: f64) -> bool {
        let target = self.position_seconds() + delta_seconds;
        self.seek(target)
    }

    pub fn change_pitch(&mut self, delta_semitones: f64) -> bool {
        if !self.state.is_loaded() || !delta_semitones.is_finite() {
            return self.reject("change_pitch");
        }
        self.pitch_semitones += delta_semitones;
        self.push_rate();
        true
    }

    pub fn reset_pitch(&mut self) -> bool {
        if !self.state.is_loaded() {
            return self.reject("reset_pitch");
        }
        self.pitch_semitones = 0.0;
        self.push_rate();
        true
    }

    fn push_rate(&mut self) {
        let rate = self.rate();
        if let Some(track) = self.track.as_mut() {
            track.sink.set_rate(rate);
        }
    }

    /// End-of-track check: a playing session that reached its end stops and rewinds.
    pub fn refresh(&mut self) -> bool {
        if self.state != SessionState::Playing {
            return false;
        }
        let duration = self.duration_seconds();
        if self.position_seconds() < duration {
            return false;
        }
        log::debug!("session {} reached end of track", self.id);
        self.stop()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let tempo = self.tempo();
        SessionSnapshot {
            id: self.id,
            source: self.source.clone(),
            state: self.state,
            waveform: self.waveform().cloned(),
            bpm: tempo.bpm(),
            tempo_detected: tempo.is_detected(),
            position_seconds: self.position_seconds(),
            duration_seconds: self.duration_seconds(),
            remaining_seconds: self.remaining_seconds(),
            pitch_semitones: self.pitch_semitones,
            rate: self.rate(),
            error: self.error.clone(),
        }
    }

    fn reject(&self, op: &str) -> bool {
        log::debug!("session {}: ignoring {op} while {}", self.id, self.state);
        false
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("state", &self.state)
            .field("pitch_semitones", &self.pitch_semitones)
            .finish_non_exhaustive()
    }
}
