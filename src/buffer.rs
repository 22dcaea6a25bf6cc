// src/buffer.rs

use crate::error::BufferError;

/// Fully decoded PCM audio, stored planar (one `Vec` per channel).
///
/// Every channel holds exactly `frame_count` samples. The buffer is never
/// mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    frame_count: usize,
    sample_rate: f64,
}

impl SampleBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: f64) -> Result<Self, BufferError> {
        if channels.is_empty() {
            return Err(BufferError::NoChannels);
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(BufferError::InvalidSampleRate(sample_rate));
        }
        let frame_count = channels[0].len();
        for (channel, samples) in channels.iter().enumerate() {
            if samples.len() != frame_count {
                return Err(BufferError::RaggedChannel {
                    channel,
                    expected: frame_count,
                    actual: samples.len(),
                });
            }
        }
        Ok(Self { channels, frame_count, sample_rate })
    }

    /// De-interleave `L R L R ...` style samples.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: usize,
        sample_rate: f64,
    ) -> Result<Self, BufferError> {
        if channel_count == 0 {
            return Err(BufferError::NoChannels);
        }
        if samples.len() % channel_count != 0 {
            return Err(BufferError::PartialFrame {
                samples: samples.len(),
                channels: channel_count,
            });
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (c, &s) in frame.iter().enumerate() {
                channels[c].push(s);
            }
        }
        Self::new(channels, sample_rate)
    }

    pub fn mono(samples: Vec<f32>, sample_rate: f64) -> Result<Self, BufferError> {
        Self::new(vec![samples], sample_rate)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate
    }

    /// Sample at a fractional frame position, linearly interpolated.
    /// Positions outside the buffer read as silence.
    #[inline]
    pub fn sample_at(&self, channel: usize, position: f64) -> f32 {
        let Some(data) = self.channels.get(channel) else {
            return 0.0;
        };
        if position < 0.0 {
            return 0.0;
        }
        let index = position as usize;
        if index >= data.len() {
            return 0.0;
        }
        let frac = (position - index as f64) as f32;
        let a = data[index];
        let b = data.get(index + 1).copied().unwrap_or(0.0);
        a + (b - a) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_channels() {
        let err = SampleBuffer::new(vec![vec![0.0; 4], vec![0.0; 3]], 44_100.0).unwrap_err();
        assert_eq!(
            err,
            BufferError::RaggedChannel { channel: 1, expected: 4, actual: 3 }
        );
    }

    #[test]
    fn rejects_bad_sample_rate_and_no_channels() {
        assert_eq!(
            SampleBuffer::new(vec![vec![0.0]], 0.0).unwrap_err(),
            BufferError::InvalidSampleRate(0.0)
        );
        assert!(SampleBuffer::new(vec![vec![0.0]], f64::NAN).is_err());
        assert_eq!(SampleBuffer::new(vec![], 48_000.0).unwrap_err(), BufferError::NoChannels);
    }

    #[test]
    fn deinterleaves_stereo() {
        let buf = SampleBuffer::from_interleaved(&[1.0, -1.0, 0.5, -0.5], 2, 8.0).unwrap();
        assert_eq!(buf.frame_count(), 2);
        assert_eq!(buf.channel(0).unwrap(), &[1.0, 0.5]);
        assert_eq!(buf.channel(1).unwrap(), &[-1.0, -0.5]);
        assert_eq!(buf.duration_seconds(), 0.25);
    }

    #[test]
    fn partial_interleaved_frame_is_an_error() {
        assert!(matches!(
            SampleBuffer::from_interleaved(&[0.0; 5], 2, 8.0),
            Err(BufferError::PartialFrame { samples: 5, channels: 2 })
        ));
    }

    #[test]
    fn interpolates_between_frames() {
        let buf = SampleBuffer::mono(vec![0.0, 1.0], 2.0).unwrap();
        assert_eq!(buf.sample_at(0, 0.5), 0.5);
        assert_eq!(buf.sample_at(0, 1.0), 1.0);
        assert_eq!(buf.sample_at(0, 2.0), 0.0);
        assert_eq!(buf.sample_at(3, 0.0), 0.0);
    }
}
