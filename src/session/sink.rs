// src/session/sink.rs

use std::sync::Arc;
use std::time::Instant;

use crate::buffer::SampleBuffer;
use crate::error::LoadError;

/// Audio output for one session. Every call is expected to return quickly.
pub trait PlaybackSink {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn set_position(&mut self, seconds: f64);
    /// Playback speed multiplier, 1.0 = original pitch.
    fn set_rate(&mut self, rate: f64);
    /// Current playhead in seconds of source audio.
    fn position(&self) -> f64;
}

/// Builds a sink for a freshly loaded buffer. Runs on the control thread.
pub trait SinkFactory {
    fn create(&self, buffer: Arc<SampleBuffer>) -> Result<Box<dyn PlaybackSink>, LoadError>;
}

impl<F> SinkFactory for F
where
    F: Fn(Arc<SampleBuffer>) -> Result<Box<dyn PlaybackSink>, LoadError>,
{
    fn create(&self, buffer: Arc<SampleBuffer>) -> Result<Box<dyn PlaybackSink>, LoadError> {
        self(buffer)
    }
}

/// Silent sink whose playhead follows the wall clock scaled by the rate.
#[derive(Debug, Clone)]
pub struct ClockSink {
    duration: f64,
    anchor: f64,
    started: Option<Instant>,
    rate: f64,
}

impl ClockSink {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration: duration_seconds.max(0.0),
            anchor: 0.0,
            started: None,
            rate: 1.0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn rebase(&mut self) {
        self.anchor = self.position();
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

impl PlaybackSink for ClockSink {
    fn play(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.anchor = self.position();
        self.started = None;
    }

    fn stop(&mut self) {
        self.anchor = 0.0;
        self.started = None;
    }

    fn set_position(&mut self, seconds: f64) {
        self.anchor = seconds.clamp(0.0, self.duration);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn set_rate(&mut self, rate: f64) {
        self.rebase();
        self.rate = rate;
    }

    fn position(&self) -> f64 {
        let elapsed = self
            .started
            .map(|t| t.elapsed().as_secs_f64() * self.rate)
            .unwrap_or(0.0);
        (self.anchor + elapsed).min(self.duration)
    }
}

/// Factory producing [`ClockSink`]s sized to each buffer.
pub fn clock_sink_factory() -> impl SinkFactory {
    |buffer: Arc<SampleBuffer>| -> Result<Box<dyn PlaybackSink>, LoadError> {
        Ok(Box::new(ClockSink::new(buffer.duration_seconds())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn paused_clock_holds_position() {
        let mut sink = ClockSink::new(10.0);
        sink.set_position(3.0);
        assert_eq!(sink.position(), 3.0);
        sleep(Duration::from_millis(5));
        assert_eq!(sink.position(), 3.0);
    }

    #[test]
    fn running_clock_advances_and_saturates() {
        let mut sink = ClockSink::new(0.01);
        sink.set_rate(2.0);
        sink.play();
        sleep(Duration::from_millis(20));
        assert_eq!(sink.position(), 0.01);
        sink.stop();
        assert_eq!(sink.position(), 0.0);
        assert!(!sink.is_running());
    }

    #[test]
    fn pause_freezes_elapsed_time() {
        let mut sink = ClockSink::new(60.0);
        sink.play();
        sleep(Duration::from_millis(10));
        sink.pause();
        let frozen = sink.position();
        assert!(frozen > 0.0);
        sleep(Duration::from_millis(10));
        assert_eq!(sink.position(), frozen);
    }

    #[test]
    fn factory_sizes_sink_to_buffer() {
        let buffer = Arc::new(SampleBuffer::mono(vec![0.0; 100], 100.0).unwrap());
        let mut sink = clock_sink_factory().create(buffer).unwrap();
        sink.set_position(5.0);
        assert_eq!(sink.position(), 1.0);
    }
}
