// src/player.rs

use crate::audio::{build_stream, setup_output_device, OutputConfig, Playhead};
use crate::buffer::SampleBuffer;
use crate::error::LoadError;
use crate::session::sink::{PlaybackSink, SinkFactory};
use cpal::traits::StreamTrait;
use cpal::{SampleFormat, Stream};
use std::sync::{atomic::Ordering, Arc};

/// Audio player driving the default output device from an in-memory buffer.
///
/// The stream stays open for the player's lifetime; pausing only silences
/// the callback.
pub struct AudioPlayer {
    _stream: Stream,
    playhead: Arc<Playhead>,
    source_sample_rate: f64,
    total_frames: f64,
}

impl AudioPlayer {
    /// Opens the default output device for `buffer`. Starts paused at 0.
    pub fn new(buffer: Arc<SampleBuffer>) -> Result<Self, anyhow::Error> {
        let playhead = Playhead::new();
        let output = setup_output_device()?;

        log::info!(
            "track info: channels: {}, sample_rate: {}, duration: {:.2}s",
            buffer.channel_count(),
            buffer.sample_rate(),
            buffer.duration_seconds()
        );

        let err_fn = |err: cpal::StreamError| log::error!("an error occurred on the output audio stream: {}", err);
        let source_sample_rate = buffer.sample_rate();
        let total_frames = buffer.frame_count() as f64;
        let OutputConfig {
            device,
            config,
            sample_format,
            ..
        } = output;

        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, buffer, playhead.clone(), err_fn)?
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, buffer, playhead.clone(), err_fn)?
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, buffer, playhead.clone(), err_fn)?
            }
            _ => anyhow::bail!("Unsupported sample format: {:?}", sample_format),
        };

        stream.play()?;

        Ok(Self {
            _stream: stream,
            playhead,
            source_sample_rate,
            total_frames,
        })
    }
}

impl PlaybackSink for AudioPlayer {
    fn play(&mut self) {
        self.playhead.playing.store(true, Ordering::Relaxed);
    }

    fn pause(&mut self) {
        self.playhead.playing.store(false, Ordering::Relaxed);
    }

    fn stop(&mut self) {
        self.playhead.playing.store(false, Ordering::Relaxed);
        self.playhead.set_position_frames(0.0);
    }

    fn set_position(&mut self, seconds: f64) {
        let frames = (seconds * self.source_sample_rate).clamp(0.0, self.total_frames);
        self.playhead.set_position_frames(frames);
    }

    fn set_rate(&mut self, rate: f64) {
        self.playhead.set_rate(rate);
    }

    fn position(&self) -> f64 {
        self.playhead.position_frames() / self.source_sample_rate
    }
}

/// Factory opening one [`AudioPlayer`] per loaded track.
pub fn cpal_sink_factory() -> impl SinkFactory {
    |buffer: Arc<SampleBuffer>| -> Result<Box<dyn PlaybackSink>, LoadError> {
        let player = AudioPlayer::new(buffer).map_err(|e| LoadError::Sink {
            reason: format!("{e:#}"),
        })?;
        Ok(Box::new(player))
    }
}
