//! Transport binding
//!
//! Glue between the pipeline and the remote audio service: requests service
//! start/stop, consumes lifecycle events, and forwards decoded buffers to the
//! session's audio stream.
//!
//! State machine:
//! `Stopped -> Starting -> Active -> Stopping -> Stopped`, plus
//! `Starting/Active -> Stopped` on a service error or a remote-initiated end.
//!
//! Only a caller-requested stop tears down the local sink and de-registers the
//! listener. A remote end without a preceding request leaves both in place, but
//! buffers are forwarded only while the state is `Active` or `Stopping`, so a
//! sink kept after a remote end receives nothing. A service error closes the
//! audio stream and releases the sink; the listener stays registered.

use super::{
    ActiveSession, AudioStreamSink, ServiceEvent, ServiceListener, ServiceType, Session,
};
use crate::audio::SampleBuffer;
use crate::events::{EventBus, StreamEvent};
use crate::playback::BufferSink;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Lifecycle state of the remote audio service as seen by the binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Active,
    Stopping,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct BindingInner {
    state: ServiceState,
    sink: Option<Arc<dyn AudioStreamSink>>,

    /// Set by `request_stop`; distinguishes our stop from a remote end
    shutdown_requested: bool,

    encrypted: bool,
}

/// Adapter between the pipeline and the session's PCM audio service
pub struct TransportBinding {
    session: Arc<dyn Session>,
    listener: ServiceListener,
    inner: Mutex<BindingInner>,
    state_tx: watch::Sender<ServiceState>,
    events: EventBus,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl TransportBinding {
    /// Create the binding and spawn the task consuming lifecycle events.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(session: Arc<dyn Session>, events: EventBus) -> Arc<Self> {
        let (listener, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ServiceState::Stopped);

        let binding = Arc::new(Self {
            session,
            listener,
            inner: Mutex::new(BindingInner {
                state: ServiceState::Stopped,
                sink: None,
                shutdown_requested: false,
                encrypted: false,
            }),
            state_tx,
            events,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        Self::spawn_event_pump(Arc::downgrade(&binding), rx);
        binding
    }

    fn spawn_event_pump(binding: Weak<Self>, mut rx: mpsc::UnboundedReceiver<ServiceEvent>) {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(binding) = binding.upgrade() else {
                    break;
                };
                binding.handle_event(event);
            }
            debug!("Transport event pump stopped");
        });
    }

    fn lock(&self) -> MutexGuard<'_, BindingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut BindingInner, state: ServiceState) {
        if inner.state != state {
            debug!("Audio service state {} -> {}", inner.state, state);
            inner.state = state;
            self.state_tx.send_replace(state);
        }
    }

    /// Ask the session to start the PCM service.
    ///
    /// Does nothing when the session is not connected, or when the service is
    /// starting, active, or still stopping.
    pub fn request_start(&self, encrypted: bool) {
        if !self.session.is_connected() {
            debug!("Session not connected; ignoring audio service start request");
            return;
        }

        {
            let mut inner = self.lock();
            if inner.state != ServiceState::Stopped {
                warn!(
                    "Audio service {}; ignoring start request",
                    inner.state
                );
                return;
            }
            inner.shutdown_requested = false;
            self.set_state(&mut inner, ServiceState::Starting);
        }

        info!("Requesting audio service start (encrypted={})", encrypted);
        self.session
            .add_service_listener(ServiceType::Pcm, self.listener.clone());
        self.session.start_service(ServiceType::Pcm, encrypted);
    }

    /// Ask the session to stop the PCM service.
    ///
    /// Marks the shutdown as caller-requested so the following end event releases
    /// the sink and de-registers the listener. Does nothing when the session is not
    /// connected or the service is already stopped.
    pub fn request_stop(&self) {
        if !self.session.is_connected() {
            debug!("Session not connected; ignoring audio service stop request");
            return;
        }

        {
            let mut inner = self.lock();
            if inner.state == ServiceState::Stopped && inner.sink.is_none() {
                debug!("Audio service already stopped; ignoring stop request");
                return;
            }
            inner.shutdown_requested = true;
            self.set_state(&mut inner, ServiceState::Stopping);
        }

        info!("Requesting audio service stop");
        self.session.stop_service(ServiceType::Pcm);
    }

    /// Apply one lifecycle event from the session.
    pub fn handle_event(&self, event: ServiceEvent) {
        if event.service() != ServiceType::Pcm {
            debug!("Ignoring lifecycle event for {:?}", event.service());
            return;
        }

        match event {
            ServiceEvent::Started {
                session, encrypted, ..
            } => self.on_service_started(session.as_ref(), encrypted),
            ServiceEvent::Ended { session, .. } => self.on_service_ended(session.as_ref()),
            ServiceEvent::Error {
                session, reason, ..
            } => self.on_service_error(session.as_ref(), reason),
        }
    }

    fn on_service_started(&self, session: &dyn ActiveSession, encrypted: bool) {
        let sink = session.start_audio_stream();

        let mut inner = self.lock();
        if sink.is_none() {
            warn!("Audio service started but the session provided no audio stream");
        }
        inner.sink = sink;
        inner.encrypted = encrypted;
        self.set_state(&mut inner, ServiceState::Active);
        drop(inner);

        info!("Audio service started (encrypted={})", encrypted);
        self.events
            .emit_lossy(StreamEvent::ServiceStarted { encrypted });
    }

    fn on_service_ended(&self, session: &dyn ActiveSession) {
        let mut inner = self.lock();
        let requested = inner.shutdown_requested;

        if requested {
            session.stop_audio_stream();
            inner.sink = None;
            inner.shutdown_requested = false;
            self.session
                .remove_service_listener(ServiceType::Pcm, &self.listener);
            info!("Audio service stopped");
        } else {
            info!("Audio service ended remotely; keeping local stream state");
        }

        self.set_state(&mut inner, ServiceState::Stopped);
        drop(inner);

        self.events
            .emit_lossy(StreamEvent::ServiceEnded { requested });
    }

    fn on_service_error(&self, session: &dyn ActiveSession, reason: String) {
        error!("Audio service error: {}", reason);

        let mut inner = self.lock();
        if inner.sink.take().is_some() {
            session.stop_audio_stream();
        }
        if matches!(inner.state, ServiceState::Starting | ServiceState::Active) {
            self.set_state(&mut inner, ServiceState::Stopped);
        }
        drop(inner);

        self.events.emit_lossy(StreamEvent::ServiceError { reason });
    }

    /// Current service state
    pub fn state(&self) -> ServiceState {
        self.lock().state
    }

    /// Watch service state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ServiceState> {
        self.state_tx.subscribe()
    }

    /// True while a sink from the session is held
    pub fn has_sink(&self) -> bool {
        self.lock().sink.is_some()
    }

    /// Whether the running service was started encrypted
    pub fn is_encrypted(&self) -> bool {
        self.lock().encrypted
    }

    /// Buffers forwarded to the session
    pub fn delivered_buffers(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Buffers dropped because no sink was active
    pub fn dropped_buffers(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl BufferSink for TransportBinding {
    /// Forward a buffer to the active sink, or drop it if there is none.
    ///
    /// Buffers arriving before the service starts or after it stops are never
    /// queued for later delivery.
    fn write(&self, buffer: SampleBuffer) -> bool {
        let sink = {
            let inner = self.lock();
            match inner.state {
                ServiceState::Active | ServiceState::Stopping => inner.sink.clone(),
                ServiceState::Starting | ServiceState::Stopped => None,
            }
        };

        match sink {
            Some(sink) => {
                sink.send_audio(buffer);
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    "No active audio sink; dropped buffer pts={}us ({} bytes, {} dropped total)",
                    buffer.presentation_time_us,
                    buffer.len(),
                    dropped
                );
                false
            }
        }
    }
}
