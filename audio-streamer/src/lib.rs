//! # Audio Streamer Library (audio-streamer)
//!
//! Decodes queued audio files into timestamped PCM buffers and streams them to a
//! remote audio service over a session-oriented transport.
//!
//! **Pipeline:** [`StreamManager::submit`] → [`playback::PlaybackQueue`] (FIFO, one
//! active decode) → [`playback::DecodeJob`] (decode thread, symphonia + rubato) →
//! [`transport::TransportBinding`] → remote session sink.
//!
//! Decode failures and service errors are published on the [`events::EventBus`].

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod playback;
pub mod transport;

pub use error::{Error, Result};
pub use manager::StreamManager;
