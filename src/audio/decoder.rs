//! PCM16 payload decoding
//!
//! Synthesis backends hand back raw audio as base64 text: signed 16-bit
//! little-endian mono samples at 24 kHz, no container. Decoding maps each
//! sample `v` to `v / 32768.0`, so the output range is `[-1.0, 0.99997]`.
//! That asymmetry is the usual PCM normalization and is kept as-is.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

use crate::{Error, Result};

/// Sample rate of synthesized speech payloads
pub const SAMPLE_RATE: u32 = 24_000;

/// Channel count of synthesized speech payloads
pub const CHANNELS: u16 = 1;

/// Immutable buffer of normalized mono samples ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Arc<[f32]>,
}

impl PcmBuffer {
    /// Wrap already-normalized samples
    #[must_use]
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    /// Normalized samples in `[-1.0, 1.0]`
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample storage
    #[must_use]
    pub fn shared(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    #[must_use]
    pub const fn channels(&self) -> u16 {
        CHANNELS
    }

    /// Playing time of the buffer
    #[must_use]
    pub fn duration(&self) -> Duration {
        let millis = (self.samples.len() as u64 * 1000) / u64::from(SAMPLE_RATE);
        Duration::from_millis(millis)
    }

    /// Encode the buffer as a 16-bit mono WAV file
    ///
    /// # Errors
    ///
    /// Returns error if the WAV writer fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| Error::Decode(e.to_string()))?;

            for &sample in self.samples.iter() {
                #[allow(clippy::cast_possible_truncation)]
                let sample_i16 = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
                writer
                    .write_sample(sample_i16)
                    .map_err(|e| Error::Decode(e.to_string()))?;
            }

            writer.finalize().map_err(|e| Error::Decode(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Decode a base64 PCM16LE mono payload into a playback buffer
///
/// # Errors
///
/// Returns [`Error::Decode`] if the payload is not valid base64 or the decoded
/// byte count is odd
pub fn decode_pcm16(payload: &str) -> Result<PcmBuffer> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Decode(format!("invalid base64: {e}")))?;

    pcm16_to_buffer(&bytes)
}

/// Reinterpret raw PCM16LE bytes as normalized samples
///
/// # Errors
///
/// Returns [`Error::Decode`] if the byte count is odd
pub fn pcm16_to_buffer(bytes: &[u8]) -> Result<PcmBuffer> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "odd PCM16 byte count: {}",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(PcmBuffer::from_samples(samples))
}
