// src/error.rs

//! Error types for loading and configuring tracks.
//!
//! A failed load never escapes its session: the registry turns a
//! [`LoadError`] into the session's `Failed` state and keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// The source could not be turned into audio.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot open {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported audio format: {reason}")]
    Unsupported { reason: String },

    #[error("corrupt audio stream: {reason}")]
    Corrupt { reason: String },

    #[error("source contains no audio frames")]
    Empty,
}

/// Sample data does not describe a valid planar buffer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("buffer has no channels")]
    NoChannels,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("channel {channel} has {actual} frames, expected {expected}")]
    RaggedChannel {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{samples} interleaved samples do not divide into {channels} channels")]
    PartialFrame { samples: usize, channels: usize },
}

/// Everything that can end a load in the `Failed` state.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to read samples: {0}")]
    BufferRead(#[from] BufferError),

    #[error("output sink unavailable: {reason}")]
    Sink { reason: String },

    #[error("load worker could not be started: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("load worker panicked: {reason}")]
    WorkerPanicked { reason: String },
}

impl LoadError {
    /// Short machine-friendly tag for snapshots and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::Decode(_) => "decode",
            LoadError::BufferRead(_) => "buffer_read",
            LoadError::Sink { .. } => "sink",
            LoadError::Spawn(_) => "spawn",
            LoadError::WorkerPanicked { .. } => "worker_panicked",
        }
    }
}

/// Rejected configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_wraps_decode_error() {
        let err: LoadError = DecodeError::Empty.into();
        assert_eq!(err.kind(), "decode");
        assert_eq!(err.to_string(), "source contains no audio frames");
    }

    #[test]
    fn buffer_error_is_a_buffer_read_failure() {
        let err: LoadError = BufferError::NoChannels.into();
        assert_eq!(err.kind(), "buffer_read");
        assert!(err.to_string().contains("no channels"));
    }
}
