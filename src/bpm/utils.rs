// src/bpm/utils.rs
use crate::buffer::SampleBuffer;

/// Per-frame energy averaged over channels: `e[i] = mean_c(x[c][i]^2)`.
pub fn energy_signal(buffer: &SampleBuffer) -> Vec<f64> {
    let frames = buffer.frame_count();
    let channels = buffer.channel_count();
    let mut out = vec![0.0f64; frames];
    if channels == 0 { return out; }
    for channel in buffer.channels() {
        for (acc, &s) in out.iter_mut().zip(channel.iter()) {
            let s = s as f64;
            *acc += s * s;
        }
    }
    let inv = 1.0 / channels as f64;
    for v in &mut out { *v *= inv; }
    out
}

/// Strict local maxima of `ac`, ignoring lags 0 and 1 and the last lag.
pub fn pick_peaks(ac: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if ac.len() < 3 { return peaks; }
    for i in 2..ac.len() - 1 {
        if ac[i] > ac[i - 1] && ac[i] > ac[i + 1] {
            peaks.push(i);
        }
    }
    peaks
}

/// Gaps between consecutive peaks that fall inside `[min_lag, max_lag]`.
pub fn beat_intervals(peaks: &[usize], min_lag: usize, max_lag: usize) -> Vec<usize> {
    peaks
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&d| d >= min_lag && d <= max_lag)
        .collect()
}

/// Seconds → whole samples, rounded half away from zero.
pub fn seconds_to_lag(seconds: f64, sample_rate: f64) -> usize {
    let lag = (seconds * sample_rate).round();
    if lag.is_finite() && lag > 0.0 { lag as usize } else { 0 }
}
