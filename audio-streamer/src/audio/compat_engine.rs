//! Legacy-compatible decode strategy
//!
//! Decodes the entire source on the first request, resamples it in one pass, then
//! serves fixed-size chunks. Exposes the same contract as the streaming engine.

use super::decoder::SourceDecoder;
use super::engine::DecodeEngine;
use super::format::SampleFormat;
use super::resampler::Resampler;
use super::types::{downmix_to_mono, BufferPacker, SampleBuffer};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whole-file decode engine
pub struct CompatEngine {
    source: PathBuf,
    format: SampleFormat,
    buffer_frames: usize,
    packer: BufferPacker,

    /// Fully decoded mono audio at the output rate; None until first request
    decoded: Option<Vec<f32>>,

    /// Read position into `decoded`
    cursor: usize,

    cancelled: bool,
}

impl CompatEngine {
    pub fn new(source: &Path, format: SampleFormat, buffer_frames: usize) -> Self {
        Self {
            source: source.to_path_buf(),
            format,
            buffer_frames: buffer_frames.max(1),
            packer: BufferPacker::new(format),
            decoded: None,
            cursor: 0,
            cancelled: false,
        }
    }

    /// Decode the entire file to mono f32 at the output rate
    fn decode_all(&self) -> Result<Vec<f32>> {
        let mut decoder = SourceDecoder::open(&self.source)?;

        let mut mono = Vec::new();
        let mut native_rate = None;

        while let Some(packet) = decoder.next_packet()? {
            match native_rate {
                None => native_rate = Some(packet.sample_rate),
                Some(rate) if rate != packet.sample_rate => {
                    return Err(Error::Decode(format!(
                        "Sample rate changed mid-stream from {}Hz to {}Hz",
                        rate, packet.sample_rate
                    )));
                }
                Some(_) => {}
            }
            mono.extend(downmix_to_mono(&packet.samples, packet.channels));
        }

        let Some(native_rate) = native_rate else {
            debug!("No audio decoded from {}", self.source.display());
            return Ok(Vec::new());
        };

        debug!(
            "Compat engine decoded {} frames at {}Hz from {}",
            mono.len(),
            native_rate,
            self.source.display()
        );

        Resampler::resample(&mono, native_rate, self.format.sample_rate_hz)
    }
}

impl DecodeEngine for CompatEngine {
    fn produce_next_buffer(&mut self) -> Result<Option<SampleBuffer>> {
        if self.cancelled {
            return Ok(None);
        }

        if self.decoded.is_none() {
            self.decoded = Some(self.decode_all()?);
        }

        let Some(decoded) = self.decoded.as_ref() else {
            return Ok(None);
        };

        if self.cursor >= decoded.len() {
            return Ok(None);
        }

        let end = (self.cursor + self.buffer_frames).min(decoded.len());
        let buffer = self.packer.pack(&decoded[self.cursor..end]);
        self.cursor = end;

        Ok(buffer)
    }

    fn cancel(&mut self) {
        self.cancelled = true;
        self.decoded = None;
    }

    fn name(&self) -> &'static str {
        "compat"
    }
}
