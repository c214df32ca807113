//! Streaming codec-based decode strategy
//!
//! Decodes one compressed packet per call, downmixes to mono, resamples
//! incrementally and encodes to the output depth. Nothing beyond the current packet
//! and the resampler's leftover frames is held in memory.

use super::decoder::SourceDecoder;
use super::engine::DecodeEngine;
use super::format::SampleFormat;
use super::resampler::StreamResampler;
use super::types::{downmix_to_mono, BufferPacker, SampleBuffer};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

struct OpenSource {
    decoder: SourceDecoder,
    resampler: Option<(u32, StreamResampler)>,
}

enum EngineState {
    /// Source not opened yet; opening happens on the decode thread
    Idle,
    Decoding(Box<OpenSource>),
    Done,
}

/// Modern packet-streaming decode engine
pub struct CodecEngine {
    source: PathBuf,
    format: SampleFormat,
    packer: BufferPacker,
    state: EngineState,
}

impl CodecEngine {
    pub fn new(source: &Path, format: SampleFormat) -> Self {
        Self {
            source: source.to_path_buf(),
            format,
            packer: BufferPacker::new(format),
            state: EngineState::Idle,
        }
    }
}

impl OpenSource {
    /// Resampler for `rate`, created on the first packet
    fn resampler_for(&mut self, rate: u32, output_rate: u32) -> Result<&mut StreamResampler> {
        if let Some((known, _)) = &self.resampler {
            if *known != rate {
                return Err(Error::Decode(format!(
                    "Sample rate changed mid-stream from {}Hz to {}Hz",
                    known, rate
                )));
            }
        }

        if self.resampler.is_none() {
            self.resampler = Some((rate, StreamResampler::new(rate, output_rate)?));
        }

        match self.resampler.as_mut() {
            Some((_, resampler)) => Ok(resampler),
            None => Err(Error::Decode("Resampler unavailable".to_string())),
        }
    }
}

impl DecodeEngine for CodecEngine {
    fn produce_next_buffer(&mut self) -> Result<Option<SampleBuffer>> {
        loop {
            match &mut self.state {
                EngineState::Idle => {
                    let decoder = SourceDecoder::open(&self.source)?;
                    self.state = EngineState::Decoding(Box::new(OpenSource {
                        decoder,
                        resampler: None,
                    }));
                }
                EngineState::Decoding(open) => match open.decoder.next_packet()? {
                    Some(packet) => {
                        let mono = downmix_to_mono(&packet.samples, packet.channels);
                        let resampler =
                            open.resampler_for(packet.sample_rate, self.format.sample_rate_hz)?;
                        let output = resampler.push(&mono)?;

                        if let Some(buffer) = self.packer.pack(&output) {
                            return Ok(Some(buffer));
                        }
                    }
                    None => {
                        let tail = match open.resampler.as_mut() {
                            Some((_, resampler)) => resampler.flush()?,
                            None => Vec::new(),
                        };
                        self.state = EngineState::Done;

                        debug!(
                            "Codec engine finished {} ({} frames)",
                            self.source.display(),
                            self.packer.frames_emitted() + tail.len() as u64
                        );
                        return Ok(self.packer.pack(&tail));
                    }
                },
                EngineState::Done => return Ok(None),
            }
        }
    }

    fn cancel(&mut self) {
        if !matches!(self.state, EngineState::Done) {
            debug!("Codec engine released for {}", self.source.display());
        }
        self.state = EngineState::Done;
    }

    fn name(&self) -> &'static str {
        "codec"
    }
}
