//! Core audio data types
//!
//! Defines the timestamped PCM chunk handed to the transport, and the conversions
//! from decoded f32 audio into the configured output encoding.

use super::format::{SampleDepth, SampleFormat};

/// A chunk of PCM audio paired with its presentation timestamp.
///
/// Owned by the decode job until it is written to the transport sink, which takes
/// ownership of it.
///
/// **Format:**
/// - Mono, little-endian, encoding given by the stream's [`SampleFormat`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    /// Encoded PCM bytes
    pub data: Vec<u8>,

    /// Presentation time of the first frame, in microseconds from job start
    pub presentation_time_us: u64,
}

impl SampleBuffer {
    pub fn new(data: Vec<u8>, presentation_time_us: u64) -> Self {
        Self {
            data,
            presentation_time_us,
        }
    }

    /// Byte length of the encoded data
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of mono frames contained, given the stream format
    pub fn frames(&self, format: &SampleFormat) -> usize {
        self.data.len() / format.bytes_per_frame()
    }
}

/// Average interleaved channels down to a single mono channel.
///
/// Input:  [L, R, L, R, ...]
/// Output: [(L+R)/2, ...]
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Encode normalized f32 samples (-1.0..=1.0) into little-endian PCM bytes.
///
/// Out-of-range samples are clamped.
pub fn encode_pcm(samples: &[f32], depth: SampleDepth) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * depth.bytes_per_sample());

    match depth {
        SampleDepth::Unsigned8 => {
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * 127.0).round() as i16 + 128;
                out.push(v as u8);
            }
        }
        SampleDepth::Signed16 => {
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleDepth::Float32 => {
            for &s in samples {
                out.extend_from_slice(&s.clamp(-1.0, 1.0).to_le_bytes());
            }
        }
    }

    out
}

/// Slices mono f32 audio into timestamped [`SampleBuffer`]s.
///
/// Tracks the number of frames emitted so far so presentation timestamps stay
/// strictly monotonic across calls.
#[derive(Debug)]
pub struct BufferPacker {
    format: SampleFormat,
    frames_emitted: u64,
}

impl BufferPacker {
    pub fn new(format: SampleFormat) -> Self {
        Self {
            format,
            frames_emitted: 0,
        }
    }

    /// Encode `samples` into one buffer. Returns None for empty input so no
    /// zero-length buffer (and no repeated timestamp) is ever produced.
    pub fn pack(&mut self, samples: &[f32]) -> Option<SampleBuffer> {
        if samples.is_empty() {
            return None;
        }

        let pts = self.format.frames_to_micros(self.frames_emitted);
        self.frames_emitted += samples.len() as u64;

        Some(SampleBuffer::new(
            encode_pcm(samples, self.format.bit_depth),
            pts,
        ))
    }

    /// Frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}
