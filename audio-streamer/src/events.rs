//! Event system for audio-streamer
//!
//! Job outcomes and service lifecycle changes are broadcast on an [`EventBus`]
//! (tokio::broadcast). This is the only channel through which decode failures and
//! transport errors reach the owner of the stream manager; `submit` never reports
//! them.

use crate::error::Error;
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline events observable by the stream manager's owner
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Job appended to the playback queue
    JobQueued { job_id: Uuid, source: PathBuf },

    /// Job reached the head of the queue and began decoding
    JobStarted { job_id: Uuid, source: PathBuf },

    /// Job decoded its source to the end
    JobFinished { job_id: Uuid, buffers: u64 },

    /// Job stopped on a decode error; the queue moved on
    JobFailed {
        job_id: Uuid,
        source: PathBuf,
        error: String,
    },

    /// Remote audio service started and a sink was acquired
    ServiceStarted { encrypted: bool },

    /// Remote audio service ended
    ///
    /// `requested` is false when the remote side ended the service on its own.
    ServiceEnded { requested: bool },

    /// Remote audio service reported an error (no automatic retry)
    ServiceError { reason: String },

    /// Queue head did not match a reporting job; the queue refuses further work
    QueueCorrupted { detail: String },
}

impl StreamEvent {
    /// The failure this event reports, if any
    ///
    /// Decode failures map to [`Error::Decode`], service errors to
    /// [`Error::Transport`], and a stopped queue to [`Error::QueueCorruption`].
    pub fn error(&self) -> Option<Error> {
        match self {
            StreamEvent::JobFailed { source, error, .. } => Some(Error::Decode(format!(
                "{}: {}",
                source.display(),
                error
            ))),
            StreamEvent::ServiceError { reason } => Some(Error::Transport(reason.clone())),
            StreamEvent::QueueCorrupted { detail } => {
                Some(Error::QueueCorruption(detail.clone()))
            }
            _ => None,
        }
    }
}

/// Broadcast channel for [`StreamEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StreamEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
