//! Loopback session
//!
//! In-process [`Session`] that acknowledges service requests immediately and
//! writes streamed PCM to a local writer. Used by the command-line front end and
//! by tests to stand in for a remote system.

use super::{ActiveSession, AudioStreamSink, ServiceEvent, ServiceListener, ServiceType, Session};
use crate::audio::SampleBuffer;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// One buffer received by an in-memory loopback stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRecord {
    pub presentation_time_us: u64,
    pub len: usize,
    pub data: Vec<u8>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct LoopbackStream {
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    records: Mutex<Vec<SinkRecord>>,
    capture: bool,
    bytes_written: AtomicU64,
}

impl AudioStreamSink for LoopbackStream {
    fn send_audio(&self, buffer: SampleBuffer) {
        if let Some(writer) = lock(&self.writer).as_mut() {
            match writer.write_all(&buffer.data) {
                Ok(()) => {
                    self.bytes_written
                        .fetch_add(buffer.len() as u64, Ordering::Relaxed);
                }
                Err(e) => warn!("Loopback write failed: {}", e),
            }
        }

        if self.capture {
            lock(&self.records).push(SinkRecord {
                presentation_time_us: buffer.presentation_time_us,
                len: buffer.len(),
                data: buffer.data,
            });
        }
    }
}

struct LoopbackActive {
    stream: Arc<LoopbackStream>,
    open: AtomicBool,
}

impl ActiveSession for LoopbackActive {
    fn start_audio_stream(&self) -> Option<Arc<dyn AudioStreamSink>> {
        self.open.store(true, Ordering::SeqCst);
        debug!("Loopback audio stream opened");
        Some(self.stream.clone())
    }

    fn stop_audio_stream(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(writer) = lock(&self.stream.writer).as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Loopback flush failed: {}", e);
            }
        }
        debug!("Loopback audio stream closed");
    }
}

/// Local stand-in for a connected remote system
pub struct LoopbackSession {
    connected: AtomicBool,
    listeners: Mutex<HashMap<ServiceType, Vec<ServiceListener>>>,
    active: Arc<LoopbackActive>,
    service_starts: AtomicU64,
}

impl LoopbackSession {
    fn with_stream(writer: Option<Box<dyn Write + Send>>, capture: bool) -> Self {
        Self {
            connected: AtomicBool::new(true),
            listeners: Mutex::new(HashMap::new()),
            active: Arc::new(LoopbackActive {
                stream: Arc::new(LoopbackStream {
                    writer: Mutex::new(writer),
                    records: Mutex::new(Vec::new()),
                    capture,
                    bytes_written: AtomicU64::new(0),
                }),
                open: AtomicBool::new(false),
            }),
            service_starts: AtomicU64::new(0),
        }
    }

    /// Session that keeps every received buffer in memory
    pub fn in_memory() -> Self {
        Self::with_stream(None, true)
    }

    /// Session that writes received PCM bytes to `writer`
    pub fn to_writer(writer: Box<dyn Write + Send>) -> Self {
        Self::with_stream(Some(writer), false)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn notify(&self, service: ServiceType, event: impl Fn() -> ServiceEvent) {
        let listeners = lock(&self.listeners)
            .get(&service)
            .cloned()
            .unwrap_or_default();

        for listener in listeners {
            if listener.send(event()).is_err() {
                debug!("Service listener for {:?} is closed", service);
            }
        }
    }

    fn active(&self) -> Arc<dyn ActiveSession> {
        self.active.clone()
    }

    /// Simulate the remote side ending the PCM service on its own
    pub fn end_service_remotely(&self) {
        self.notify(ServiceType::Pcm, || ServiceEvent::Ended {
            session: self.active(),
            service: ServiceType::Pcm,
        });
    }

    /// Simulate a service error reported by the remote side
    pub fn inject_error(&self, reason: &str) {
        self.notify(ServiceType::Pcm, || ServiceEvent::Error {
            session: self.active(),
            service: ServiceType::Pcm,
            reason: reason.to_string(),
        });
    }

    /// Buffers received so far, in arrival order. Always empty for a session
    /// writing to a writer.
    pub fn records(&self) -> Vec<SinkRecord> {
        lock(&self.active.stream.records).clone()
    }

    /// Bytes successfully written to the output writer
    pub fn bytes_written(&self) -> u64 {
        self.active.stream.bytes_written.load(Ordering::Relaxed)
    }

    pub fn audio_stream_open(&self) -> bool {
        self.active.open.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self, service: ServiceType) -> usize {
        lock(&self.listeners).get(&service).map_or(0, Vec::len)
    }

    /// Number of start requests received
    pub fn service_starts(&self) -> u64 {
        self.service_starts.load(Ordering::SeqCst)
    }
}

impl Session for LoopbackSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn add_service_listener(&self, service: ServiceType, listener: ServiceListener) {
        let mut listeners = lock(&self.listeners);
        let registered = listeners.entry(service).or_default();
        if !registered.iter().any(|l| l.same_channel(&listener)) {
            registered.push(listener);
        }
    }

    fn remove_service_listener(&self, service: ServiceType, listener: &ServiceListener) {
        if let Some(registered) = lock(&self.listeners).get_mut(&service) {
            registered.retain(|l| !l.same_channel(listener));
        }
    }

    fn start_service(&self, service: ServiceType, encrypted: bool) {
        self.service_starts.fetch_add(1, Ordering::SeqCst);
        debug!("Loopback starting {:?} (encrypted={})", service, encrypted);
        self.notify(service, || ServiceEvent::Started {
            session: self.active(),
            service,
            encrypted,
        });
    }

    fn stop_service(&self, service: ServiceType) {
        debug!("Loopback stopping {:?}", service);
        self.notify(service, || ServiceEvent::Ended {
            session: self.active(),
            service,
        });
    }
}
