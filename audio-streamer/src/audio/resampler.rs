//! Audio resampling using rubato
//!
//! Converts decoded mono audio to the stream's configured sample rate.
//!
//! Two shapes are provided:
//! - [`Resampler::resample`] converts a whole decoded file in one pass
//! - [`StreamResampler`] converts packet by packet, carrying leftover input frames
//!   between calls

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Input frames fed to the streaming resampler per processing step
const STREAM_CHUNK_FRAMES: usize = 1024;

/// Audio resampler using rubato for sample rate conversion.
pub struct Resampler;

impl Resampler {
    /// Resample mono audio from `input_rate` to `output_rate`.
    ///
    /// # Notes
    /// If the rates already match, returns a copy without resampling
    pub fn resample(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
        if input_rate == output_rate || input.is_empty() {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(input.to_vec());
        }

        debug!(
            "Resampling {} frames from {}Hz to {}Hz",
            input.len(),
            input_rate,
            output_rate
        );

        let mut resampler = Self::create_resampler(input_rate, output_rate, input.len())?;

        let planar_input = vec![input.to_vec()];
        let planar_output = resampler
            .process(planar_input.as_slice(), None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        Ok(planar_output.into_iter().next().unwrap_or_default())
    }

    /// Create a mono rubato resampler.
    ///
    /// Uses FastFixedIn for a good quality/performance tradeoff.
    fn create_resampler(
        input_rate: u32,
        output_rate: u32,
        chunk_size: usize,
    ) -> Result<FastFixedIn<f32>> {
        FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            chunk_size,
            1,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))
    }
}

/// Incremental mono resampler for packet-by-packet decoding.
pub struct StreamResampler {
    /// None when input and output rates match
    inner: Option<FastFixedIn<f32>>,

    /// Input frames not yet consumed by the resampler
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        let inner = if input_rate == output_rate {
            None
        } else {
            debug!(
                "Streaming resampler {}Hz -> {}Hz",
                input_rate, output_rate
            );
            Some(Resampler::create_resampler(
                input_rate,
                output_rate,
                STREAM_CHUNK_FRAMES,
            )?)
        };

        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// True when samples pass through unchanged
    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Feed decoded frames, returning every output frame that is ready.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }

            let chunk = vec![self.pending.drain(..needed).collect::<Vec<f32>>()];
            let planar = resampler
                .process(chunk.as_slice(), None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

            if let Some(channel) = planar.first() {
                output.extend_from_slice(channel);
            }
        }

        Ok(output)
    }

    /// Process whatever input is left over at end of stream.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let rest = vec![std::mem::take(&mut self.pending)];
        let planar = resampler
            .process_partial(Some(rest.as_slice()), None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        Ok(planar.into_iter().next().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / rate as f32;
                (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
            })
            .collect()
    }

    #[test]
    fn test_resample_same_rate() {
        let input = vec![0.1, 0.2, 0.3];
        let output = Resampler::resample(&input, 16000, 16000).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_empty() {
        let output = Resampler::resample(&[], 48000, 16000).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_resample_different_rate() {
        let input_rate = 48000;
        let input = sine(4800, input_rate);

        let output = Resampler::resample(&input, input_rate, 16000).unwrap();

        // Output should be roughly a third of the input length
        let expected = 1600;
        assert!(
            output.len() >= expected - 10 && output.len() <= expected + 10,
            "Expected ~{} frames, got {}",
            expected,
            output.len()
        );
    }

    #[test]
    fn test_stream_passthrough() {
        let mut resampler = StreamResampler::new(16000, 16000).unwrap();
        assert!(resampler.is_passthrough());
        assert_eq!(resampler.push(&[0.5, 0.25]).unwrap(), vec![0.5, 0.25]);
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_stream_resample_total_length() {
        let mut resampler = StreamResampler::new(44100, 22050).unwrap();
        let input = sine(44100, 44100);

        let mut output = Vec::new();
        for packet in input.chunks(1152) {
            output.extend(resampler.push(packet).unwrap());
        }
        output.extend(resampler.flush().unwrap());

        // One second of input yields roughly one second of output
        assert!(
            output.len() > 21000 && output.len() < 23100,
            "Expected ~22050 frames, got {}",
            output.len()
        );
    }
}
