// src/registry.rs

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::analyzer::{AnalyzedTrack, load_track};
use crate::config::EngineConfig;
use crate::decoder::{Decoder, SourceRef};
use crate::error::LoadError;
use crate::session::sink::SinkFactory;
use crate::session::snapshot::SessionSnapshot;
use crate::session::{PlaybackSession, SessionId};

/// Handle for one in-flight load.
struct LoadTicket {
    serial: u64,
    cancel: Arc<AtomicBool>,
}

/// What a load worker sends back: the whole result or nothing.
struct LoadMessage {
    session: SessionId,
    serial: u64,
    outcome: Result<AnalyzedTrack, LoadError>,
}

/// Owns every session, runs their loads in the background and exposes a
/// poll surface for the front end.
///
/// Drive it from one control thread: call [`update`](Self::update) then
/// [`poll`](Self::poll) on each tick, and transport methods in between.
pub struct SessionRegistry {
    config: EngineConfig,
    decoder: Arc<dyn Decoder>,
    sinks: Box<dyn SinkFactory>,
    sessions: Vec<PlaybackSession>,
    in_flight: HashMap<SessionId, LoadTicket>,
    next_id: u64,
    next_serial: u64,
    results_tx: Sender<LoadMessage>,
    results_rx: Receiver<LoadMessage>,
}

impl SessionRegistry {
    pub fn new(
        config: EngineConfig,
        decoder: Arc<dyn Decoder>,
        sinks: impl SinkFactory + 'static,
    ) -> Self {
        let (results_tx, results_rx) = channel();
        Self {
            config,
            decoder,
            sinks: Box::new(sinks),
            sessions: Vec::new(),
            in_flight: HashMap::new(),
            next_id: 0,
            next_serial: 0,
            results_tx,
            results_rx,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Session set ---

    /// Create a session for `source` and start loading it in the background.
    pub fn add(&mut self, source: impl Into<SourceRef>) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        let source = source.into();
        log::info!("session {id}: added {source}");
        self.sessions.push(PlaybackSession::new(id, source));
        let index = self.sessions.len() - 1;
        self.start_load(index);
        id
    }

    /// Cancel any in-flight load, destroy the session and forget it.
    pub fn remove(&mut self, id: SessionId) -> bool {
        let Some(index) = self.index_of(id) else { return false };
        self.cancel_load(id);
        let mut session = self.sessions.remove(index);
        session.destroy();
        log::info!("session {id}: removed");
        true
    }

    /// Throw away loaded audio and analysis and load the source again.
    /// A failed session is not retried.
    pub fn reload(&mut self, id: SessionId) -> bool {
        let Some(index) = self.index_of(id) else { return false };
        self.cancel_load(id);
        if !self.sessions[index].unload() {
            return false;
        }
        self.start_load(index);
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|s| s.id()).collect()
    }

    pub fn session(&self, id: SessionId) -> Option<&PlaybackSession> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut PlaybackSession> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    /// Number of loads still running.
    pub fn pending_loads(&self) -> usize {
        self.in_flight.len()
    }

    // --- Tick ---

    /// Commit finished loads and run end-of-track checks.
    pub fn update(&mut self) {
        loop {
            match self.results_rx.try_recv() {
                Ok(msg) => self.commit(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        for session in &mut self.sessions {
            session.refresh();
        }
    }

    /// Snapshots of every session, in insertion order. Never blocks.
    pub fn poll(&self) -> Vec<SessionSnapshot> {
        self.sessions.iter().map(PlaybackSession::snapshot).collect()
    }

    /// Block until every load has been committed or `timeout` passes.
    /// Returns `true` when nothing is left in flight.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.update();
            if self.in_flight.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.results_rx.recv_timeout(deadline - now) {
                Ok(msg) => self.commit(msg),
                Err(RecvTimeoutError::Timeout) => return self.in_flight.is_empty(),
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    // --- Transport shortcuts ---

    pub fn play(&mut self, id: SessionId) -> bool {
        self.session_mut(id).is_some_and(|s| s.play())
    }

    pub fn pause(&mut self, id: SessionId) -> bool {
        self.session_mut(id).is_some_and(|s| s.pause())
    }

    pub fn stop(&mut self, id: SessionId) -> bool {
        self.session_mut(id).is_some_and(|s| s.stop())
    }

    pub fn toggle_playback(&mut self, id: SessionId) -> bool {
        self.session_mut(id).is_some_and(|s| s.toggle_playback())
    }

    pub fn seek(&mut self, id: SessionId, seconds: f64) -> bool {
        self.session_mut(id).is_some_and(|s| s.seek(seconds))
    }

    pub fn seek_by(&mut self, id: SessionId, delta_seconds: f64) -> bool {
        self.session_mut(id).is_some_and(|s| s.seek_by(delta_seconds))
    }

    pub fn change_pitch(&mut self, id: SessionId, delta_semitones: f64) -> bool {
        self.session_mut(id).is_some_and(|s| s.change_pitch(delta_semitones))
    }

    pub fn reset_pitch(&mut self, id: SessionId) -> bool {
        self.session_mut(id).is_some_and(|s| s.reset_pitch())
    }

    // --- Internals ---

    fn index_of(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == id)
    }

    fn cancel_load(&mut self, id: SessionId) {
        if let Some(ticket) = self.in_flight.remove(&id) {
            ticket.cancel.store(true, Ordering::Release);
            log::debug!("session {id}: cancelled load #{}", ticket.serial);
        }
    }

    fn start_load(&mut self, index: usize) {
        let session = &mut self.sessions[index];
        if !session.begin_load() {
            return;
        }
        let id = session.id();
        let source = session.source().clone();

        let serial = self.next_serial;
        self.next_serial += 1;
        let cancel = Arc::new(AtomicBool::new(false));

        let decoder = Arc::clone(&self.decoder);
        let config = self.config.clone();
        let tx = self.results_tx.clone();
        let worker_cancel = Arc::clone(&cancel);

        let spawned = thread::Builder::new()
            .name(format!("deck-load-{}", id.0))
            .spawn(move || {
                let started = Instant::now();
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    load_track(decoder.as_ref(), &source, &config, &worker_cancel)
                }));
                let outcome = match result {
                    Ok(Some(outcome)) => outcome,
                    Ok(None) => return,
                    Err(payload) => Err(LoadError::WorkerPanicked {
                        reason: panic_message(payload.as_ref()),
                    }),
                };
                if worker_cancel.load(Ordering::Acquire) {
                    return;
                }
                log::debug!("session {id}: load finished in {:?}", started.elapsed());
                // the registry may already be gone; nothing left to notify
                let _ = tx.send(LoadMessage { session: id, serial, outcome });
            });

        match spawned {
            Ok(_) => {
                log::info!("session {id}: loading {}", self.sessions[index].source());
                self.in_flight.insert(id, LoadTicket { serial, cancel });
            }
            Err(e) => {
                log::warn!("session {id}: could not start load worker: {e}");
                self.sessions[index].load_failed(LoadError::Spawn(e));
            }
        }
    }

    fn commit(&mut self, msg: LoadMessage) {
        let LoadMessage { session: id, serial, outcome } = msg;
        let current = self.in_flight.get(&id).is_some_and(|t| t.serial == serial);
        if !current {
            log::debug!("session {id}: discarding stale load #{serial}");
            return;
        }
        self.in_flight.remove(&id);

        let Some(index) = self.index_of(id) else { return };
        let outcome = outcome.and_then(|track| {
            let sink = self.sinks.create(Arc::clone(&track.buffer))?;
            Ok((track, sink))
        });
        let session = &mut self.sessions[index];
        match outcome {
            Ok((track, sink)) => {
                log::info!(
                    "session {id}: loaded {:.1}s, tempo {}",
                    track.buffer.duration_seconds(),
                    if track.tempo.is_detected() {
                        format!("{:.1} BPM", track.tempo.bpm())
                    } else {
                        "unknown".to_string()
                    }
                );
                session.load_succeeded(track, sink);
            }
            Err(e) => {
                log::warn!("session {id}: load failed: {e}");
                session.load_failed(e);
            }
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        for ticket in self.in_flight.values() {
            ticket.cancel.store(true, Ordering::Release);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleBuffer;
    use crate::error::DecodeError;
    use crate::session::SessionState;
    use crate::session::sink::clock_sink_factory;
    use std::sync::atomic::AtomicUsize;

    fn registry_with(decoder: impl Decoder + 'static) -> SessionRegistry {
        SessionRegistry::new(EngineConfig::default(), Arc::new(decoder), clock_sink_factory())
    }

    fn one_second(_: &SourceRef) -> Result<SampleBuffer, LoadError> {
        Ok(SampleBuffer::mono(vec![0.5; 1_000], 1_000.0)?)
    }

    #[test]
    fn add_loads_in_background_and_commits_on_update() {
        let mut reg = registry_with(one_second);
        let id = reg.add("a.wav");
        assert_eq!(reg.session(id).unwrap().state(), SessionState::Loading);
        assert!(reg.wait_idle(Duration::from_secs(5)));
        let snap = &reg.poll()[0];
        assert_eq!(snap.state, SessionState::Stopped);
        assert_eq!(snap.duration_seconds, 1.0);
        assert_eq!(snap.waveform.as_ref().unwrap().len(), 200);
    }

    #[test]
    fn failed_decode_marks_only_that_session() {
        let mut reg = registry_with(|src: &SourceRef| -> Result<SampleBuffer, LoadError> {
            if src.path().ends_with("bad.wav") {
                Err(DecodeError::Corrupt { reason: "truncated".into() }.into())
            } else {
                one_second(src)
            }
        });
        let good = reg.add("good.wav");
        let bad = reg.add("bad.wav");
        assert!(reg.wait_idle(Duration::from_secs(5)));
        assert_eq!(reg.session(good).unwrap().state(), SessionState::Stopped);
        let failed = reg.session(bad).unwrap();
        assert_eq!(failed.state(), SessionState::Failed);
        assert!(failed.error().unwrap().message.contains("truncated"));
    }

    #[test]
    fn panicking_decoder_becomes_failed_load() {
        let mut reg = registry_with(|_: &SourceRef| -> Result<SampleBuffer, LoadError> {
            panic!("decoder blew up")
        });
        let id = reg.add("x.wav");
        assert!(reg.wait_idle(Duration::from_secs(5)));
        let session = reg.session(id).unwrap();
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.error().unwrap().kind, "worker_panicked");
        assert!(session.error().unwrap().message.contains("decoder blew up"));
    }

    #[test]
    fn sink_factory_failure_fails_the_load() {
        let mut reg = SessionRegistry::new(
            EngineConfig::default(),
            Arc::new(one_second),
            |_: Arc<SampleBuffer>| -> Result<Box<dyn crate::session::sink::PlaybackSink>, LoadError> {
                Err(LoadError::Sink { reason: "no device".into() })
            },
        );
        let id = reg.add("a.wav");
        assert!(reg.wait_idle(Duration::from_secs(5)));
        assert_eq!(reg.session(id).unwrap().error().unwrap().kind, "sink");
    }

    #[test]
    fn poll_keeps_insertion_order() {
        let mut reg = registry_with(one_second);
        let ids: Vec<_> = ["c.wav", "a.wav", "b.wav"].into_iter().map(|p| reg.add(p)).collect();
        reg.wait_idle(Duration::from_secs(5));
        let polled: Vec<_> = reg.poll().into_iter().map(|s| s.id).collect();
        assert_eq!(polled, ids);
        assert_eq!(reg.ids(), ids);
    }

    #[test]
    fn transport_on_unknown_id_is_rejected() {
        let mut reg = registry_with(one_second);
        assert!(!reg.play(SessionId(99)));
        assert!(!reg.remove(SessionId(99)));
        assert!(!reg.reload(SessionId(99)));
    }

    #[test]
    fn reload_replaces_analysis() {
        let mut reg = registry_with(one_second);
        let id = reg.add("a.wav");
        reg.wait_idle(Duration::from_secs(5));
        reg.change_pitch(id, 2.0);
        assert!(reg.reload(id));
        assert_eq!(reg.session(id).unwrap().state(), SessionState::Loading);
        assert!(reg.session(id).unwrap().waveform().is_none());
        assert!(reg.wait_idle(Duration::from_secs(5)));
        let s = reg.session(id).unwrap();
        assert_eq!(s.state(), SessionState::Stopped);
        assert_eq!(s.pitch_semitones(), 2.0);
    }

    #[test]
    fn reload_does_not_revive_a_failed_session() {
        let calls = AtomicUsize::new(0);
        let mut reg = registry_with(move |src: &SourceRef| -> Result<SampleBuffer, LoadError> {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DecodeError::Empty.into())
            } else {
                one_second(src)
            }
        });
        let id = reg.add("flaky.wav");
        assert!(reg.wait_idle(Duration::from_secs(5)));
        assert_eq!(reg.session(id).unwrap().state(), SessionState::Failed);

        assert!(!reg.reload(id));
        assert_eq!(reg.pending_loads(), 0);
        assert!(reg.wait_idle(Duration::from_secs(1)));
        let s = reg.session(id).unwrap();
        assert_eq!(s.state(), SessionState::Failed);
        assert_eq!(s.error().unwrap().kind, "decode");
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
