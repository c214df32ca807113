//! Audio decoding and PCM conversion
//!
//! Everything between a source file on disk and a timestamped PCM chunk ready for
//! the transport: format resolution, symphonia decoding, rubato resampling, and
//! the two decode strategies.

pub mod codec_engine;
pub mod compat_engine;
pub mod decoder;
pub mod engine;
pub mod format;
pub mod resampler;
pub mod types;

pub use engine::{CapabilityDecoderFactory, DecodeEngine, DecoderCapability, DecoderFactory};
pub use format::{SampleDepth, SampleFormat, SamplingRate};
pub use types::SampleBuffer;
