//! Decode engine abstraction
//!
//! A decode engine turns one audio source into a sequence of [`SampleBuffer`]s in the
//! stream's output format. Two strategies exist, chosen once per job from the
//! platform capability flag:
//! - [`CodecEngine`]: streaming, packet-by-packet decoding
//! - [`CompatEngine`]: whole-file decoding served in fixed-size chunks
//!
//! The rest of the pipeline only sees `Box<dyn DecodeEngine>`.

use super::codec_engine::CodecEngine;
use super::compat_engine::CompatEngine;
use super::format::SampleFormat;
use super::types::SampleBuffer;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Capability shared by both decode strategies.
///
/// Called from the job's decode thread only; never shared between threads.
pub trait DecodeEngine: Send {
    /// Produce the next buffer.
    ///
    /// Returns `Ok(None)` once the source is exhausted. Buffers are returned in
    /// strictly increasing presentation-time order. Any `Err` is terminal.
    fn produce_next_buffer(&mut self) -> Result<Option<SampleBuffer>>;

    /// Release decoder resources. Further calls to `produce_next_buffer` end the stream.
    fn cancel(&mut self);

    /// Strategy name for logging
    fn name(&self) -> &'static str;
}

/// Platform capability level selecting the decode strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderCapability {
    /// Modern codec-based streaming decoder
    #[default]
    Codec,
    /// Legacy-compatible whole-file decoder
    Compat,
}

impl FromStr for DecoderCapability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "codec" => Ok(DecoderCapability::Codec),
            "compat" => Ok(DecoderCapability::Compat),
            other => Err(Error::Config(format!(
                "unknown decoder strategy '{}' (expected codec or compat)",
                other
            ))),
        }
    }
}

impl fmt::Display for DecoderCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderCapability::Codec => f.write_str("codec"),
            DecoderCapability::Compat => f.write_str("compat"),
        }
    }
}

/// Builds the decode engine for each submitted source
pub trait DecoderFactory: Send + Sync {
    fn create(&self, source: &Path, format: SampleFormat) -> Box<dyn DecodeEngine>;
}

/// Default factory: picks the strategy from a fixed capability flag
#[derive(Debug, Clone, Copy)]
pub struct CapabilityDecoderFactory {
    capability: DecoderCapability,
    buffer_frames: usize,
}

impl CapabilityDecoderFactory {
    pub fn new(capability: DecoderCapability, buffer_frames: usize) -> Self {
        Self {
            capability,
            buffer_frames: buffer_frames.max(1),
        }
    }
}

impl DecoderFactory for CapabilityDecoderFactory {
    fn create(&self, source: &Path, format: SampleFormat) -> Box<dyn DecodeEngine> {
        match self.capability {
            DecoderCapability::Codec => Box::new(CodecEngine::new(source, format)),
            DecoderCapability::Compat => {
                Box::new(CompatEngine::new(source, format, self.buffer_frames))
            }
        }
    }
}
