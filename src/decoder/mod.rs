// src/decoder/mod.rs

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use symphonia::core::audio::SampleBuffer as PacketBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use crate::buffer::SampleBuffer;
use crate::error::{DecodeError, LoadError};

/// Where a track's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceRef {
    path: PathBuf,
}

impl SourceRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<&str> for SourceRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for SourceRef {
    fn from(path: PathBuf) -> Self {
        Self { path }
    }
}

/// Turns a source into a fully decoded [`SampleBuffer`].
///
/// Called from load worker threads, so implementations must be shareable.
pub trait Decoder: Send + Sync {
    fn decode(&self, source: &SourceRef) -> Result<SampleBuffer, LoadError>;
}

impl<F> Decoder for F
where
    F: Fn(&SourceRef) -> Result<SampleBuffer, LoadError> + Send + Sync,
{
    fn decode(&self, source: &SourceRef) -> Result<SampleBuffer, LoadError> {
        self(source)
    }
}

/// File decoder backed by symphonia (wav, mp3, flac, ogg, aac).
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl Decoder for SymphoniaDecoder {
    fn decode(&self, source: &SourceRef) -> Result<SampleBuffer, LoadError> {
        let (samples, sample_rate, channels) = decode_interleaved(source.path())?;
        if samples.is_empty() {
            return Err(DecodeError::Empty.into());
        }
        log::debug!(
            "decoded {}: {} frames, {} Hz, {} ch",
            source,
            samples.len() / channels,
            sample_rate,
            channels
        );
        Ok(SampleBuffer::from_interleaved(&samples, channels, sample_rate as f64)?)
    }
}

/// Decode the default track of `path` into interleaved f32 samples.
///
/// The channel layout of the first non-empty packet wins; later packets that
/// disagree are up- or down-mixed between mono and stereo, anything else is
/// dropped.
pub fn decode_interleaved(path: &Path) -> Result<(Vec<f32>, u32, usize), DecodeError> {
    let file = File::open(path).map_err(|source| DecodeError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| unsupported(&e))?;
    let mut format = probed.format;
    let track = format.default_track().ok_or_else(|| DecodeError::Unsupported {
        reason: "no default audio track".into(),
    })?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(&e))?;
    let mut sample_buf: Option<PacketBuffer<f32>> = None;
    let mut out = Vec::<f32>::new();

    let mut sample_rate = codec_params.sample_rate.unwrap_or(44_100);
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);
    let mut format_locked = false;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Corrupt { reason: e.to_string() }),
        };
        if packet.track_id() != track_id { continue; }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // a single bad packet is skipped, like most players do
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("skipping undecodable packet in {}: {msg}", path.display());
                continue;
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(DecodeError::Corrupt { reason: e.to_string() }),
        };

        let spec = *decoded.spec();
        let current_channels = spec.channels.count();

        // 1. Lock format on the first valid packet
        if !format_locked {
            if decoded.frames() == 0 { continue; }
            sample_rate = spec.rate;
            channels = current_channels;
            format_locked = true;
        }

        // 2. Prepare Buffer (capacity is in samples, not frames)
        let too_small = sample_buf
            .as_ref()
            .is_none_or(|b| !fits_packet(b.capacity(), decoded.capacity(), current_channels));
        if too_small {
            sample_buf = Some(PacketBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else { continue };
        buf.copy_interleaved_ref(decoded);

        // 3. Handle Channel Mismatch
        append_packet(&mut out, buf.samples(), current_channels, channels);
    }

    if channels == 0 {
        return Err(DecodeError::Unsupported { reason: "track reports zero channels".into() });
    }
    Ok((out, sample_rate, channels))
}

/// Whether a packet buffer holding `capacity_samples` can take `frames` frames of `channels`.
fn fits_packet(capacity_samples: usize, frames: usize, channels: usize) -> bool {
    capacity_samples >= frames.saturating_mul(channels)
}

/// Append interleaved `samples` to `out`, up/down-mixing between mono and stereo
/// when the packet disagrees with the locked layout.
fn append_packet(out: &mut Vec<f32>, samples: &[f32], packet_channels: usize, locked_channels: usize) {
    if packet_channels == locked_channels {
        out.extend_from_slice(samples);
    } else if packet_channels == 1 && locked_channels == 2 {
        for &s in samples {
            out.push(s);
            out.push(s);
        }
    } else if packet_channels == 2 && locked_channels == 1 {
        for pair in samples.chunks_exact(2) {
            out.push((pair[0] + pair[1]) * 0.5);
        }
    } else {
        log::warn!(
            "dropping packet with {packet_channels} channels (track locked to {locked_channels})"
        );
    }
}

fn unsupported(e: &SymphoniaError) -> DecodeError {
    match e {
        SymphoniaError::IoError(io) => DecodeError::Corrupt { reason: io.to_string() },
        other => DecodeError::Unsupported { reason: other.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::{Channels, SignalSpec};

    #[test]
    fn missing_file_is_unreadable() {
        let err = SymphoniaDecoder
            .decode(&SourceRef::new("/no/such/track.wav"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Decode(DecodeError::Unreadable { .. })));
    }

    #[test]
    fn garbage_is_not_decodable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not an audio file").unwrap();
        let err = SymphoniaDecoder.decode(&SourceRef::new(&path)).unwrap_err();
        assert!(matches!(err, LoadError::Decode(_)), "{err}");
    }

    #[test]
    fn mono_sized_buffer_does_not_fit_a_stereo_packet() {
        let mono = PacketBuffer::<f32>::new(1152, SignalSpec::new(44_100, Channels::FRONT_LEFT));
        assert!(fits_packet(mono.capacity(), 1152, 1));
        assert!(!fits_packet(mono.capacity(), 1152, 2));
        assert!(!fits_packet(mono.capacity(), 600, 2));
        assert!(fits_packet(mono.capacity(), 576, 2));
    }

    #[test]
    fn stereo_packet_in_mono_track_is_downmixed() {
        let mut out = vec![0.25];
        append_packet(&mut out, &[1.0, 0.0, 0.5, 0.5], 2, 1);
        assert_eq!(out, vec![0.25, 0.5, 0.5]);
    }

    #[test]
    fn mono_packet_in_stereo_track_is_upmixed() {
        let mut out = Vec::new();
        append_packet(&mut out, &[0.5, -0.25], 1, 2);
        assert_eq!(out, vec![0.5, 0.5, -0.25, -0.25]);
    }

    #[test]
    fn unrelated_layouts_are_dropped() {
        let mut out = Vec::new();
        append_packet(&mut out, &[0.1; 6], 6, 2);
        assert!(out.is_empty());
    }

    #[test]
    fn closures_are_decoders() {
        let decoder = |_: &SourceRef| -> Result<SampleBuffer, LoadError> {
            Ok(SampleBuffer::mono(vec![0.0; 4], 4.0)?)
        };
        let buf = decoder.decode(&SourceRef::from("anything")).unwrap();
        assert_eq!(buf.frame_count(), 4);
    }
}
