//! Audio Test File Generation Utilities
//!
//! Generates deterministic WAV files with known characteristics for exercising
//! the real decode strategies.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Number of frames in `duration_ms` at `sample_rate`
pub fn frame_count(sample_rate: u32, duration_ms: u64) -> u64 {
    (sample_rate as u64 * duration_ms) / 1000
}

/// Generate a silent 16-bit WAV file
pub fn generate_silent_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;

    let total_samples = frame_count(sample_rate, duration_ms) * channels as u64;
    for _ in 0..total_samples {
        writer.write_sample(0i16)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a 16-bit sine wave WAV file with the same signal on every channel
///
/// # Arguments
/// * `frequency_hz` - Sine wave frequency in Hz (e.g., 440.0 for A4)
/// * `amplitude` - Amplitude 0.0-1.0 (0.5 recommended to avoid clipping)
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let amplitude_i16 = (amplitude * i16::MAX as f32) as i16;

    for frame_idx in 0..frame_count(sample_rate, duration_ms) {
        let t = frame_idx as f32 / sample_rate as f32;
        let sample_i16 = ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16 as f32) as i16;

        for _ in 0..channels {
            writer.write_sample(sample_i16)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
