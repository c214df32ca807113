//! Remote audio transport
//!
//! Collaborator contracts for the session-oriented audio service, and the
//! [`TransportBinding`] that adapts the pipeline to them.
//!
//! Session lifecycle callbacks are delivered as [`ServiceEvent`] values over an
//! unbounded channel, so the binding sees them one at a time and in order.

pub mod binding;
pub mod loopback;

pub use binding::{ServiceState, TransportBinding};
pub use loopback::{LoopbackSession, SinkRecord};

use crate::audio::SampleBuffer;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Service channels offered by the remote session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// Raw PCM audio streaming
    Pcm,
}

/// Registered receiver of service lifecycle events
pub type ServiceListener = mpsc::UnboundedSender<ServiceEvent>;

/// Lifecycle notification from the session
pub enum ServiceEvent {
    Started {
        session: Arc<dyn ActiveSession>,
        service: ServiceType,
        encrypted: bool,
    },
    Ended {
        session: Arc<dyn ActiveSession>,
        service: ServiceType,
    },
    Error {
        session: Arc<dyn ActiveSession>,
        service: ServiceType,
        reason: String,
    },
}

impl ServiceEvent {
    pub fn service(&self) -> ServiceType {
        match self {
            ServiceEvent::Started { service, .. }
            | ServiceEvent::Ended { service, .. }
            | ServiceEvent::Error { service, .. } => *service,
        }
    }
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEvent::Started {
                service, encrypted, ..
            } => f
                .debug_struct("Started")
                .field("service", service)
                .field("encrypted", encrypted)
                .finish(),
            ServiceEvent::Ended { service, .. } => {
                f.debug_struct("Ended").field("service", service).finish()
            }
            ServiceEvent::Error {
                service, reason, ..
            } => f
                .debug_struct("Error")
                .field("service", service)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Writable audio stream of an active session
pub trait AudioStreamSink: Send + Sync {
    /// Send PCM bytes stamped with their presentation time. Takes ownership.
    fn send_audio(&self, buffer: SampleBuffer);
}

/// Session object handed over with lifecycle events
pub trait ActiveSession: Send + Sync {
    /// Open the audio stream. None if the session cannot provide one.
    fn start_audio_stream(&self) -> Option<Arc<dyn AudioStreamSink>>;

    fn stop_audio_stream(&self);
}

/// Connection to the remote system
///
/// Registering the same listener twice for a service has no additional effect.
pub trait Session: Send + Sync {
    fn is_connected(&self) -> bool;

    fn add_service_listener(&self, service: ServiceType, listener: ServiceListener);

    fn remove_service_listener(&self, service: ServiceType, listener: &ServiceListener);

    fn start_service(&self, service: ServiceType, encrypted: bool);

    fn stop_service(&self, service: ServiceType);
}
