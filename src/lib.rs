// src/lib.rs

pub mod analyzer;
pub mod audio;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
mod player;
pub mod registry;
pub mod session;
pub mod waveform;

pub mod bpm;
pub use bpm::{TempoEstimate, TempoEstimator, estimate_tempo};

pub use analyzer::{AnalyzedTrack, analyze_buffer};
pub use buffer::SampleBuffer;
pub use config::{AutocorrelationMethod, EngineConfig, TempoOptions};
pub use decoder::{Decoder, SourceRef, SymphoniaDecoder};
pub use error::{BufferError, ConfigError, DecodeError, LoadError};
pub use player::{AudioPlayer, cpal_sink_factory};
pub use registry::SessionRegistry;
pub use session::sink::{ClockSink, PlaybackSink, SinkFactory, clock_sink_factory};
pub use session::snapshot::{SessionError, SessionSnapshot};
pub use session::{PlaybackSession, SessionId, SessionState};
pub use waveform::Waveform; // convenience
