//! Stream manager
//!
//! Public entry point of the pipeline. Owns the playback queue and the transport
//! binding, and builds a decode job for every submitted file.
//!
//! The output format is resolved once in [`StreamManager::configure`] and is fixed
//! for the manager's lifetime.

use crate::audio::{CapabilityDecoderFactory, DecoderFactory, SampleFormat};
use crate::config::StreamConfig;
use crate::error::Result;
use crate::events::{EventBus, StreamEvent};
use crate::playback::{BufferSink, DecodeJob, JobSnapshot, PlaybackQueue};
use crate::transport::{ServiceState, Session, TransportBinding};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use uuid::Uuid;

/// Orchestrates decoding and delivery of submitted audio files
pub struct StreamManager {
    format: SampleFormat,
    factory: Arc<dyn DecoderFactory>,
    events: EventBus,
    queue: PlaybackQueue,
    binding: Arc<TransportBinding>,
}

impl StreamManager {
    /// Resolve the output format and build the pipeline around `session`.
    ///
    /// The decode strategy is picked from `config.decoder`. Must be called within a
    /// Tokio runtime.
    ///
    /// # Errors
    /// [`Error::UnsupportedFormat`](crate::Error::UnsupportedFormat) if the sample-rate
    /// label or bit depth is not recognized.
    pub fn configure(session: Arc<dyn Session>, config: &StreamConfig) -> Result<Self> {
        let factory = CapabilityDecoderFactory::new(config.decoder, config.buffer_frames);
        Self::with_factory(session, config, Arc::new(factory))
    }

    /// Like [`configure`](Self::configure), with a caller-supplied decoder factory
    pub fn with_factory(
        session: Arc<dyn Session>,
        config: &StreamConfig,
        factory: Arc<dyn DecoderFactory>,
    ) -> Result<Self> {
        let format = SampleFormat::resolve(&config.sample_rate, config.bits_per_sample)?;

        let events = EventBus::default();
        let queue = PlaybackQueue::new(events.clone());
        let binding = TransportBinding::new(session, events.clone());

        info!(
            "Stream manager configured: {} ({} decoder)",
            format, config.decoder
        );

        Ok(Self {
            format,
            factory,
            events,
            queue,
            binding,
        })
    }

    /// Output format of every buffer
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Ask the remote session to start the audio service
    pub fn start_service(&self, encrypted: bool) {
        self.binding.request_start(encrypted);
    }

    /// Ask the remote session to stop the audio service.
    ///
    /// A job still decoding keeps running; its buffers are dropped once the sink is
    /// released.
    pub fn stop_service(&self) {
        self.binding.request_stop();
    }

    /// Queue `source` for playback and return without waiting for decoding.
    ///
    /// Decode failures are reported on the event bus, never here.
    ///
    /// # Errors
    /// [`Error::QueueCorruption`](crate::Error::QueueCorruption) once the queue has
    /// stopped after an invariant violation.
    pub fn submit(&self, source: impl Into<PathBuf>) -> Result<Uuid> {
        let source = source.into();
        let engine = self.factory.create(&source, self.format);
        let sink: Arc<dyn BufferSink> = self.binding.clone();

        debug!("Submitting {} ({} engine)", source.display(), engine.name());
        self.queue.submit(DecodeJob::new(source, engine, sink))
    }

    /// Subscribe to job and service events
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Watch the audio service state
    pub fn service_state(&self) -> watch::Receiver<ServiceState> {
        self.binding.subscribe_state()
    }

    /// Jobs queued or decoding
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// States of all queued jobs, head first
    pub fn queue_snapshot(&self) -> Vec<JobSnapshot> {
        self.queue.snapshot()
    }

    /// Wait until every submitted job has finished or failed
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Buffers dropped because no audio sink was active
    pub fn dropped_buffers(&self) -> u64 {
        self.binding.dropped_buffers()
    }

    /// Buffers delivered to the audio sink
    pub fn delivered_buffers(&self) -> u64 {
        self.binding.delivered_buffers()
    }
}
