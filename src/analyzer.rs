// src/analyzer.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bpm::{TempoEstimate, TempoEstimator};
use crate::buffer::SampleBuffer;
use crate::config::EngineConfig;
use crate::decoder::{Decoder, SourceRef};
use crate::error::LoadError;
use crate::waveform::Waveform;

/// Everything a load publishes at once: the decoded audio and both analyses.
#[derive(Debug, Clone)]
pub struct AnalyzedTrack {
    pub buffer: Arc<SampleBuffer>,
    pub waveform: Waveform,
    pub tempo: TempoEstimate,
}

/// Run waveform extraction and tempo estimation over a decoded buffer.
pub fn analyze_buffer(buffer: SampleBuffer, config: &EngineConfig) -> AnalyzedTrack {
    let waveform = Waveform::extract(&buffer, config.waveform_resolution);
    let tempo = TempoEstimator::new(config.tempo.clone()).estimate(&buffer);
    AnalyzedTrack {
        buffer: Arc::new(buffer),
        waveform,
        tempo,
    }
}

/// Decode + analyze, checking `cancel` between stages.
///
/// Returns `None` once cancellation is observed; nothing partial is returned.
pub fn load_track(
    decoder: &dyn Decoder,
    source: &SourceRef,
    config: &EngineConfig,
    cancel: &AtomicBool,
) -> Option<Result<AnalyzedTrack, LoadError>> {
    let buffer = match decoder.decode(source) {
        Ok(b) => b,
        Err(e) => return Some(Err(e)),
    };
    if cancel.load(Ordering::Acquire) { return None; }

    let waveform = Waveform::extract(&buffer, config.waveform_resolution);
    if cancel.load(Ordering::Acquire) { return None; }

    let tempo = TempoEstimator::new(config.tempo.clone()).estimate(&buffer);
    if cancel.load(Ordering::Acquire) { return None; }

    Some(Ok(AnalyzedTrack {
        buffer: Arc::new(buffer),
        waveform,
        tempo,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    fn tone(_: &SourceRef) -> Result<SampleBuffer, LoadError> {
        let samples = (0..8_000).map(|i| ((i as f32) * 0.01).sin()).collect();
        Ok(SampleBuffer::mono(samples, 8_000.0)?)
    }

    #[test]
    fn load_produces_waveform_of_configured_resolution() {
        let config = EngineConfig { waveform_resolution: 32, ..Default::default() };
        let track = load_track(&tone, &"a.wav".into(), &config, &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert_eq!(track.waveform.len(), 32);
        assert_eq!(track.buffer.frame_count(), 8_000);
    }

    #[test]
    fn cancelled_load_returns_nothing() {
        let cancel = AtomicBool::new(true);
        assert!(load_track(&tone, &"a.wav".into(), &EngineConfig::default(), &cancel).is_none());
    }

    #[test]
    fn decode_errors_are_reported_even_when_cancelled() {
        let broken = |_: &SourceRef| -> Result<SampleBuffer, LoadError> {
            Err(DecodeError::Empty.into())
        };
        let out = load_track(&broken, &"x".into(), &EngineConfig::default(), &AtomicBool::new(true));
        assert!(matches!(out, Some(Err(LoadError::Decode(DecodeError::Empty)))));
    }

    #[test]
    fn analyze_buffer_matches_load_track() {
        let config = EngineConfig::default();
        let buf = tone(&"a".into()).unwrap();
        let direct = analyze_buffer(buf, &config);
        let loaded = load_track(&tone, &"a".into(), &config, &AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert_eq!(direct.waveform, loaded.waveform);
        assert_eq!(direct.tempo, loaded.tempo);
    }
}
