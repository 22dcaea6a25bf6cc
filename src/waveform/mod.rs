// src/waveform/mod.rs
pub mod terminal;

use crate::buffer::SampleBuffer;
use serde::Serialize;

/// Fixed-length peak envelope, every point in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Waveform {
    points: Vec<f32>,
}

impl Waveform {
    /// Reduce `buffer` to exactly `resolution` normalized peaks.
    ///
    /// Window `i` spans frames `[i*n/R, (i+1)*n/R)`. Each point is the
    /// largest absolute sample across all channels in its window, empty
    /// windows read as 0. The result is scaled so the loudest point is 1.0;
    /// silence stays all zeros.
    pub fn extract(buffer: &SampleBuffer, resolution: usize) -> Self {
        let n = buffer.frame_count() as u64;
        let r = resolution as u64;
        let mut points = vec![0.0f32; resolution];
        let mut global_peak = 0.0f32;

        for (i, point) in points.iter_mut().enumerate() {
            let start = (i as u64 * n / r) as usize;
            let end = ((i as u64 + 1) * n / r) as usize;
            if start >= end {
                continue;
            }
            let mut peak = 0.0f32;
            for channel in buffer.channels() {
                for &s in &channel[start..end] {
                    let a = s.abs();
                    if a > peak { peak = a; }
                }
            }
            *point = peak;
            if peak > global_peak { global_peak = peak; }
        }

        // Normalize
        if global_peak > 0.0 {
            let scale = 1.0 / global_peak;
            for v in &mut points {
                *v = (*v * scale).min(1.0);
            }
        }

        Self { points }
    }

    pub fn points(&self) -> &[f32] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
