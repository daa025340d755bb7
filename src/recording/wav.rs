//! WAV encoding and decoding
//!
//! Recorded call audio is a WAV stream. The capture side encodes PCM with
//! [`encode_wav`]; playback decodes it through [`WavDecoder`].

use crate::utils::{CallError, CallResult};
use bytes::Bytes;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;

/// Encode 16-bit PCM samples (interleaved when `channels > 1`) as a WAV stream
pub fn encode_wav(
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut data = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut data), spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(data)
}

/// Split an encoded stream into chunks of at most `chunk_size` bytes, the way
/// a media recorder hands out data while a call is running
pub fn wav_chunks(encoded: &[u8], chunk_size: usize) -> Vec<Bytes> {
    encoded
        .chunks(chunk_size.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Format details of a decodable recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Length in frames (samples per channel)
    pub frames: u32,
}

impl AudioInfo {
    /// Length of the decoded audio in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Open decoder over recorded bytes
pub struct WavDecoder {
    reader: WavReader<Cursor<Bytes>>,
    info: AudioInfo,
}

impl WavDecoder {
    /// Parse the WAV header of `data`.
    ///
    /// Fails with `UnsupportedFormat` when the bytes are not a WAV stream or
    /// use a sample layout playback cannot convert.
    pub fn open(data: Bytes) -> CallResult<Self> {
        let reader = WavReader::new(Cursor::new(data))
            .map_err(|e| CallError::UnsupportedFormat(e.to_string()))?;

        let spec = reader.spec();
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 8..=32) | (SampleFormat::Float, 32) => {}
            (format, bits) => {
                return Err(CallError::UnsupportedFormat(format!(
                    "{:?} samples with {} bits",
                    format, bits
                )));
            }
        }
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(CallError::UnsupportedFormat(
                "missing channel or sample rate information".to_string(),
            ));
        }

        let info = AudioInfo {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            frames: reader.duration(),
        };

        Ok(Self { reader, info })
    }

    pub fn info(&self) -> AudioInfo {
        self.info
    }

    /// Move the decode cursor to `position_secs`
    pub fn seek(&mut self, position_secs: f64) -> CallResult<()> {
        let frame = (position_secs.max(0.0) * self.info.sample_rate as f64) as u64;
        let frame = frame.min(self.info.frames as u64) as u32;

        self.reader
            .seek(frame)
            .map_err(|e| CallError::ResourceUnavailable(format!("decoder seek failed: {}", e)))
    }

    /// Decode up to `frames` frames as interleaved 16-bit samples
    pub fn read_frames(&mut self, frames: usize) -> CallResult<Vec<i16>> {
        let wanted = frames.saturating_mul(self.info.channels as usize);
        let spec = self.reader.spec();

        let decoded: Result<Vec<i16>, hound::Error> = match spec.sample_format {
            SampleFormat::Float => self
                .reader
                .samples::<f32>()
                .take(wanted)
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect(),
            SampleFormat::Int if spec.bits_per_sample <= 16 => {
                self.reader.samples::<i16>().take(wanted).collect()
            }
            SampleFormat::Int => {
                let shift = spec.bits_per_sample - 16;
                self.reader
                    .samples::<i32>()
                    .take(wanted)
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect()
            }
        };

        decoded.map_err(|e| CallError::UnsupportedFormat(e.to_string()))
    }
}

impl std::fmt::Debug for WavDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavDecoder").field("info", &self.info).finish()
    }
}
