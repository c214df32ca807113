//! Audio source decoding using symphonia
//!
//! Opens a file, probes its container, and decodes the default audio track packet by
//! packet into interleaved f32 samples. Shared by both decode strategies.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer as SymphoniaSampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// One decoded packet of audio
#[derive(Debug)]
pub struct DecodedPacket {
    /// Interleaved f32 samples [L, R, L, R, ...]
    pub samples: Vec<f32>,

    /// Native sample rate of the packet
    pub sample_rate: u32,

    /// Channel count of the packet
    pub channels: usize,
}

impl DecodedPacket {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }
}

/// Symphonia-backed decoder for a single audio file
pub struct SourceDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    packets_decoded: u64,
}

impl SourceDecoder {
    /// Open and probe an audio file
    ///
    /// # Errors
    /// - Failed to open file
    /// - Unsupported container or codec
    /// - No audio track
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening audio source: {}", path.display());

        let file = File::open(path).map_err(|e| {
            Error::Decode(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Hint the probe with the file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                Error::Decode(format!(
                    "Failed to probe format of {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                Error::Decode(format!("No audio track found in {}", path.display()))
            })?;

        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Audio track {}: sample_rate={:?}, channels={:?}",
            track_id,
            track.codec_params.sample_rate,
            track.codec_params.channels.map(|c| c.count())
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            packets_decoded: 0,
        })
    }

    /// Decode the next packet of the audio track.
    ///
    /// Returns `Ok(None)` at end of stream. Corrupt packets are skipped with a
    /// warning, matching how players treat recoverable decode errors.
    pub fn next_packet(&mut self) -> Result<Option<DecodedPacket>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!(
                        "Reached end of {} after {} packets",
                        self.path.display(),
                        self.packets_decoded
                    );
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Decoder reset required, treating as end of stream");
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::Decode(format!(
                        "Failed to read packet from {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    self.packets_decoded += 1;

                    let spec = *decoded.spec();
                    let mut buffer =
                        SymphoniaSampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);

                    return Ok(Some(DecodedPacket {
                        samples: buffer.samples().to_vec(),
                        sample_rate: spec.rate,
                        channels: spec.channels.count(),
                    }));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet in {}: {}", self.path.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Decode(format!(
                        "Decode failed for {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            }
        }
    }
}
