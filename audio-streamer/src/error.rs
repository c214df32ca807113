//! Error types for audio-streamer
//!
//! Defines the crate error type using thiserror for clear error propagation.
//!
//! Job-local failures (`Decode`) are absorbed by the playback queue and surfaced
//! through the event bus. `QueueCorruption` is never recoverable.

use thiserror::Error;

/// Main error type for the streaming pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Sample rate label or bit depth not recognized
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Protocol-usage error (e.g. starting a job twice)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Audio decoding errors (per job, non-fatal to the queue)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Remote audio service errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Head of the playback queue does not match the reporting job
    #[error("Queue corruption: {0}")]
    QueueCorruption(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the audio-streamer Error
pub type Result<T> = std::result::Result<T, Error>;
