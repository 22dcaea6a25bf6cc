// src/config.rs

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Default number of points in a waveform envelope.
pub const DEFAULT_WAVEFORM_RESOLUTION: usize = 200;

/// How the autocorrelation series is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutocorrelationMethod {
    /// Direct sum for small inputs, FFT otherwise.
    #[default]
    Auto,
    Direct,
    Fft,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoOptions {
    /// Longest lag examined, in seconds.
    pub max_lag_seconds: f64,
    /// Shortest accepted beat interval (200 BPM).
    pub min_interval_seconds: f64,
    /// Longest accepted beat interval (40 BPM).
    pub max_interval_seconds: f64,
    pub method: AutocorrelationMethod,
}

impl Default for TempoOptions {
    fn default() -> Self {
        Self {
            max_lag_seconds: 2.0,
            min_interval_seconds: 0.3,
            max_interval_seconds: 1.5,
            method: AutocorrelationMethod::Auto,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub waveform_resolution: usize,
    pub tempo: TempoOptions,
    /// Cadence at which a front end is expected to call `update` + `poll`.
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            waveform_resolution: DEFAULT_WAVEFORM_RESOLUTION,
            tempo: TempoOptions::default(),
            poll_interval_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.waveform_resolution == 0 {
            return Err(ConfigError::Invalid {
                field: "waveform_resolution",
                reason: "must be at least 1".into(),
            });
        }
        let t = &self.tempo;
        if !(t.max_lag_seconds.is_finite() && t.max_lag_seconds > 0.0) {
            return Err(ConfigError::Invalid {
                field: "tempo.max_lag_seconds",
                reason: format!("must be positive, got {}", t.max_lag_seconds),
            });
        }
        if !(t.min_interval_seconds.is_finite() && t.min_interval_seconds > 0.0) {
            return Err(ConfigError::Invalid {
                field: "tempo.min_interval_seconds",
                reason: format!("must be positive, got {}", t.min_interval_seconds),
            });
        }
        if !(t.max_interval_seconds.is_finite() && t.max_interval_seconds >= t.min_interval_seconds) {
            return Err(ConfigError::Invalid {
                field: "tempo.max_interval_seconds",
                reason: format!(
                    "must be at least min_interval_seconds ({}), got {}",
                    t.min_interval_seconds, t.max_interval_seconds
                ),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.waveform_resolution, 200);
        assert_eq!(cfg.tempo.max_lag_seconds, 2.0);
        assert_eq!(cfg.tempo.min_interval_seconds, 0.3);
        assert_eq!(cfg.tempo.max_interval_seconds, 1.5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "waveform_resolution": 64, "tempo": {{ "method": "fft" }} }}"#).unwrap();

        let cfg = EngineConfig::load(file.path()).unwrap();
        assert_eq!(cfg.waveform_resolution, 64);
        assert_eq!(cfg.tempo.method, AutocorrelationMethod::Fft);
        assert_eq!(cfg.tempo.max_lag_seconds, 2.0);
        assert_eq!(cfg.poll_interval_ms, 50);
    }

    #[test]
    fn inverted_interval_band_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.tempo.max_interval_seconds = 0.1;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("tempo.max_interval_seconds"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
