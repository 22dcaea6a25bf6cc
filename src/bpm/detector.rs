// src/bpm/detector.rs
use rustfft::{FftPlanner, num_complex::Complex, num_traits::Zero};
use serde::Serialize;

use crate::bpm::utils::{beat_intervals, energy_signal, pick_peaks, seconds_to_lag};
use crate::buffer::SampleBuffer;
use crate::config::{AutocorrelationMethod, TempoOptions};

/// Above this many multiply-adds the direct sum is replaced by the FFT path.
const DIRECT_WORK_LIMIT: usize = 1 << 22;

/// FFT output smaller than `ac[0] * FLUSH_RATIO` is rounding residue.
const FLUSH_RATIO: f64 = 1e-10;

/// Estimated tempo. `bpm == 0` means no confident estimate, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TempoEstimate {
    bpm: f64,
}

impl TempoEstimate {
    pub const UNKNOWN: Self = Self { bpm: 0.0 };

    pub fn from_bpm(bpm: f64) -> Self {
        if bpm.is_finite() && bpm > 0.0 { Self { bpm } } else { Self::UNKNOWN }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn is_detected(&self) -> bool {
        self.bpm > 0.0
    }
}

/// Intermediate results of one estimate, mostly for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoAnalysis {
    pub estimate: TempoEstimate,
    pub max_lag: usize,
    pub peaks: Vec<usize>,
    pub intervals: Vec<usize>,
}

/// Autocorrelation tempo estimator over a short-term energy signal.
pub struct TempoEstimator {
    planner: FftPlanner<f64>,
    options: TempoOptions,
}

impl TempoEstimator {
    pub fn new(options: TempoOptions) -> Self {
        Self {
            planner: FftPlanner::<f64>::new(),
            options,
        }
    }

    pub fn options(&self) -> &TempoOptions {
        &self.options
    }

    pub fn estimate(&mut self, buffer: &SampleBuffer) -> TempoEstimate {
        self.analyze(buffer).estimate
    }

    pub fn analyze(&mut self, buffer: &SampleBuffer) -> TempoAnalysis {
        let sr = buffer.sample_rate();
        let n = buffer.frame_count();

        // 1. energy
        let energy = energy_signal(buffer);

        // 2. lag window
        let max_lag = n.min(seconds_to_lag(self.options.max_lag_seconds, sr));

        // 3. autocorrelation
        let ac = match self.method_for(n, max_lag) {
            AutocorrelationMethod::Fft => autocorrelate_fft(&energy, max_lag, &mut self.planner),
            _ => autocorrelate_direct(&energy, max_lag),
        };

        // 4. peaks, 5. intervals
        let peaks = pick_peaks(&ac);
        let min_interval = seconds_to_lag(self.options.min_interval_seconds, sr);
        let max_interval = seconds_to_lag(self.options.max_interval_seconds, sr);
        let intervals = beat_intervals(&peaks, min_interval, max_interval);

        // 6. bpm
        let estimate = if intervals.is_empty() {
            TempoEstimate::UNKNOWN
        } else {
            let mean = intervals.iter().sum::<usize>() as f64 / intervals.len() as f64;
            TempoEstimate::from_bpm(60.0 * sr / mean)
        };

        TempoAnalysis { estimate, max_lag, peaks, intervals }
    }

    fn method_for(&self, n: usize, max_lag: usize) -> AutocorrelationMethod {
        match self.options.method {
            AutocorrelationMethod::Auto => {
                if n.saturating_mul(max_lag) <= DIRECT_WORK_LIMIT {
                    AutocorrelationMethod::Direct
                } else {
                    AutocorrelationMethod::Fft
                }
            }
            other => other,
        }
    }
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::new(TempoOptions::default())
    }
}

/// Convenience one-shot estimate with default planner state.
pub fn estimate_tempo(buffer: &SampleBuffer, options: &TempoOptions) -> TempoEstimate {
    TempoEstimator::new(options.clone()).estimate(buffer)
}

// ---------- Autocorrelation ----------

/// `ac[lag] = sum_i x[i] * x[i + lag]` for `lag` in `0..max_lag`.
pub fn autocorrelate_direct(x: &[f64], max_lag: usize) -> Vec<f64> {
    let n = x.len();
    let max_lag = max_lag.min(n);
    let mut out = vec![0.0f64; max_lag];
    for (lag, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0f64;
        for i in 0..n - lag {
            acc += x[i] * x[i + lag];
        }
        *slot = acc;
    }
    out
}

/// Same series as [`autocorrelate_direct`] via the power spectrum.
pub fn autocorrelate_fft(x: &[f64], max_lag: usize, planner: &mut FftPlanner<f64>) -> Vec<f64> {
    let n = x.len();
    let max_lag = max_lag.min(n);
    if max_lag == 0 { return Vec::new(); }

    // zero-pad to at least 2n so the circular correlation does not wrap
    let conv = (n * 2).next_power_of_two();
    let fft = planner.plan_fft_forward(conv);
    let ifft = planner.plan_fft_inverse(conv);

    let mut buf: Vec<Complex<f64>> = vec![Complex::zero(); conv];
    for (slot, &v) in buf.iter_mut().zip(x.iter()) {
        slot.re = v;
    }
    fft.process(&mut buf);
    for v in buf.iter_mut() {
        *v = Complex { re: v.norm_sqr(), im: 0.0 };
    }
    ifft.process(&mut buf);

    let scale = 1.0 / conv as f64;
    let mut out: Vec<f64> = buf[..max_lag].iter().map(|c| c.re * scale).collect();

    let floor = out[0].abs() * FLUSH_RATIO;
    for v in &mut out {
        if v.abs() <= floor { *v = 0.0; }
    }
    out
}
