//! Sample format resolution
//!
//! Translates the externally supplied sample-rate label and bits-per-sample value
//! into the concrete PCM format sent to the remote audio service.
//!
//! Unrecognized values fail closed with [`Error::UnsupportedFormat`]; nothing is
//! defaulted.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Nominal sampling rate labels accepted by the audio service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplingRate {
    /// "8KHZ"
    EightKhz,
    /// "16KHZ"
    SixteenKhz,
    /// "22KHZ"
    TwentyTwoKhz,
    /// "44KHZ"
    FortyFourKhz,
}

impl SamplingRate {
    /// Label as used in configuration
    pub fn label(self) -> &'static str {
        match self {
            SamplingRate::EightKhz => "8KHZ",
            SamplingRate::SixteenKhz => "16KHZ",
            SamplingRate::TwentyTwoKhz => "22KHZ",
            SamplingRate::FortyFourKhz => "44KHZ",
        }
    }

    /// Concrete rate in Hz
    ///
    /// 22KHZ maps to 22050 Hz (the common audio rate, not 22000) and 44KHZ to
    /// twice that.
    pub fn hz(self) -> u32 {
        match self {
            SamplingRate::EightKhz => 8000,
            SamplingRate::SixteenKhz => 16000,
            SamplingRate::TwentyTwoKhz => 22050,
            SamplingRate::FortyFourKhz => 44100,
        }
    }
}

impl FromStr for SamplingRate {
    type Err = Error;

    fn from_str(label: &str) -> Result<Self> {
        match label {
            "8KHZ" => Ok(SamplingRate::EightKhz),
            "16KHZ" => Ok(SamplingRate::SixteenKhz),
            "22KHZ" => Ok(SamplingRate::TwentyTwoKhz),
            "44KHZ" => Ok(SamplingRate::FortyFourKhz),
            other => Err(Error::UnsupportedFormat(format!(
                "unknown sample rate label '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SamplingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// PCM sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleDepth {
    /// Unsigned 8-bit, 128 = silence
    Unsigned8,
    /// Signed 16-bit little-endian
    Signed16,
    /// IEEE 754 single precision little-endian
    Float32,
}

impl SampleDepth {
    /// Size of one sample in bytes
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleDepth::Unsigned8 => 1,
            SampleDepth::Signed16 => 2,
            SampleDepth::Float32 => 4,
        }
    }

    fn from_bits(bits_per_sample: u8) -> Result<Self> {
        match bits_per_sample {
            8 => Ok(SampleDepth::Unsigned8),
            16 => Ok(SampleDepth::Signed16),
            other => Err(Error::UnsupportedFormat(format!(
                "unsupported bits per sample {}",
                other
            ))),
        }
    }
}

/// Output PCM format for every buffer handed to the transport
///
/// Resolved once when the stream manager is configured and never recomputed per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    pub bit_depth: SampleDepth,
    pub sample_rate_hz: u32,
}

impl SampleFormat {
    /// Resolve the format from a sample-rate label and bits-per-sample value.
    ///
    /// # Errors
    /// [`Error::UnsupportedFormat`] if the label is not one of 8KHZ, 16KHZ, 22KHZ,
    /// 44KHZ or the bit depth is not 8 or 16.
    pub fn resolve(sample_rate_label: &str, bits_per_sample: u8) -> Result<Self> {
        let rate: SamplingRate = sample_rate_label.parse()?;
        let bit_depth = SampleDepth::from_bits(bits_per_sample)?;

        Ok(Self {
            bit_depth,
            sample_rate_hz: rate.hz(),
        })
    }

    /// Bytes occupied by one mono frame
    pub fn bytes_per_frame(&self) -> usize {
        self.bit_depth.bytes_per_sample()
    }

    /// Presentation time of the frame at `frame_index`, in microseconds
    pub fn frames_to_micros(&self, frame_index: u64) -> u64 {
        frame_index * 1_000_000 / self.sample_rate_hz as u64
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz {:?}", self.sample_rate_hz, self.bit_depth)
    }
}
