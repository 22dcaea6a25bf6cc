// src/audio.rs

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use crate::buffer::SampleBuffer;

/// Helper struct to hold output device info
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Finds the default audio output device and its config.
pub fn setup_output_device() -> Result<OutputConfig, anyhow::Error> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no output device available")?;
    let supported_config = device
        .default_output_config()
        .context("querying default output config")?;
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    log::info!(
        "output device: channels: {}, sample_rate: {:?}",
        output_channels,
        config.sample_rate
    );

    Ok(OutputConfig {
        device,
        config,
        sample_format,
        output_channels,
        output_sample_rate,
    })
}

/// Lock-free state shared between the control thread and the output callback.
///
/// Position is a fractional source frame stored as `f64` bits.
pub struct Playhead {
    pub playing: AtomicBool,
    position_bits: AtomicU64,
    rate_bits: AtomicU64,
}

impl Playhead {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            playing: AtomicBool::new(false),
            position_bits: AtomicU64::new(0f64.to_bits()),
            rate_bits: AtomicU64::new(1f64.to_bits()),
        })
    }

    pub fn position_frames(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Acquire))
    }

    pub fn set_position_frames(&self, frames: f64) {
        self.position_bits.store(frames.max(0.0).to_bits(), Ordering::Release);
    }

    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    pub fn set_rate(&self, rate: f64) {
        self.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }

    /// Move from `from` to `to` unless a seek landed in between.
    fn advance(&self, from: f64, to: f64) {
        let _ = self.position_bits.compare_exchange(
            from.to_bits(),
            to.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Fill one interleaved output block from `buffer`, reading at
/// `rate * source_rate / output_rate` source frames per output frame.
/// Source channels are mapped round-robin onto output channels.
pub fn render_block(
    buffer: &SampleBuffer,
    playhead: &Playhead,
    output_sample_rate: u32,
    output_channels: usize,
    out: &mut [f32],
) {
    out.fill(0.0);
    if !playhead.playing.load(Ordering::Relaxed) || output_channels == 0 {
        return;
    }
    let start = playhead.position_frames();
    let step = playhead.rate() * buffer.sample_rate() / output_sample_rate as f64;
    let end_of_track = buffer.frame_count() as f64;
    let src_channels = buffer.channel_count();

    let mut pos = start;
    for frame in out.chunks_mut(output_channels) {
        if pos >= end_of_track {
            pos = end_of_track;
            break;
        }
        for (c, sample) in frame.iter_mut().enumerate() {
            *sample = buffer.sample_at(c % src_channels, pos);
        }
        pos += step;
    }
    playhead.advance(start, pos.min(end_of_track));
}

/// Build CPAL output stream that pulls from `buffer` through `playhead`.
pub fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    buffer: Arc<SampleBuffer>,
    playhead: Arc<Playhead>,
    err_fn: fn(cpal::StreamError),
) -> Result<Stream, anyhow::Error>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
{
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;
    let mut scratch: Vec<f32> = Vec::with_capacity(4096);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() != data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                render_block(&buffer, &playhead, output_sample_rate, output_channels, &mut scratch);
                for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(s);
                }
            },
            err_fn,
            None,
        )
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: f64) -> SampleBuffer {
        SampleBuffer::mono((0..frames).map(|i| i as f32).collect(), sample_rate).unwrap()
    }

    #[test]
    fn paused_playhead_renders_silence_and_holds() {
        let buf = ramp(16, 8.0);
        let head = Playhead::new();
        head.set_position_frames(3.0);
        let mut out = vec![1.0f32; 8];
        render_block(&buf, &head, 8, 2, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(head.position_frames(), 3.0);
    }

    #[test]
    fn unity_rate_copies_mono_to_both_channels() {
        let buf = ramp(16, 8.0);
        let head = Playhead::new();
        head.playing.store(true, Ordering::Relaxed);
        let mut out = vec![0.0f32; 6];
        render_block(&buf, &head, 8, 2, &mut out);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        assert_eq!(head.position_frames(), 3.0);
    }

    #[test]
    fn double_rate_skips_frames_and_stops_at_end() {
        let buf = ramp(4, 8.0);
        let head = Playhead::new();
        head.playing.store(true, Ordering::Relaxed);
        head.set_rate(2.0);
        let mut out = vec![9.0f32; 4];
        render_block(&buf, &head, 8, 1, &mut out);
        assert_eq!(out, vec![0.0, 2.0, 0.0, 0.0]);
        assert_eq!(head.position_frames(), 4.0);
    }

    #[test]
    fn source_rate_is_converted_to_device_rate() {
        let buf = ramp(8, 4.0);
        let head = Playhead::new();
        head.playing.store(true, Ordering::Relaxed);
        let mut out = vec![0.0f32; 4];
        render_block(&buf, &head, 8, 1, &mut out);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(head.position_frames(), 2.0);
    }
}
