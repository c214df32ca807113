//! Decode job
//!
//! Wraps one audio source and its decode engine. `start()` moves the engine onto a
//! dedicated decode thread which pushes every produced buffer to the sink and then
//! reports exactly one terminal outcome.
//!
//! The one-terminal-report rule is carried by [`CompletionToken`]: it is created by
//! `start()`, cannot be cloned, and is consumed by the report.

use crate::audio::{DecodeEngine, SampleBuffer};
use crate::error::{Error, Result};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Destination for decoded buffers
///
/// Implemented by the transport binding. Ownership of the buffer passes to the sink.
pub trait BufferSink: Send + Sync {
    /// Deliver one buffer. Returns false if the buffer was dropped.
    fn write(&self, buffer: SampleBuffer) -> bool;
}

/// Lifecycle state of a decode job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Queued behind another job
    Pending,
    /// Decode thread running
    Decoding,
    /// Source decoded to the end
    Finished,
    /// Decoder reported an error
    Failed,
}

/// Terminal result of a decode job
#[derive(Debug)]
pub enum JobOutcome {
    Finished { buffers: u64 },
    Failed { error: Error, buffers: u64 },
}

impl JobOutcome {
    pub fn buffers(&self) -> u64 {
        match self {
            JobOutcome::Finished { buffers } | JobOutcome::Failed { buffers, .. } => *buffers,
        }
    }

    fn terminal_state(&self) -> JobState {
        match self {
            JobOutcome::Finished { .. } => JobState::Finished,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }
}

/// Proof that a job has not yet reported its terminal outcome
#[must_use = "a job that never reports its completion stalls the queue"]
pub struct CompletionToken {
    job_id: Uuid,
}

impl CompletionToken {
    pub(crate) fn new(job_id: Uuid) -> Self {
        Self { job_id }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionToken")
            .field("job_id", &self.job_id)
            .finish()
    }
}

/// Receives the single terminal report of a started job
pub trait CompletionListener: Send + Sync {
    fn on_job_terminal(&self, token: CompletionToken, outcome: JobOutcome);
}

/// One queued audio source
pub struct DecodeJob {
    id: Uuid,
    source: PathBuf,
    engine: Option<Box<dyn DecodeEngine>>,
    sink: Arc<dyn BufferSink>,
    state: JobState,
}

impl DecodeJob {
    /// Create a pending job bound to `engine` and `sink`
    pub fn new(source: PathBuf, engine: Box<dyn DecodeEngine>, sink: Arc<dyn BufferSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            engine: Some(engine),
            sink,
            state: JobState::Pending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Begin decoding on a dedicated thread and return immediately.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if the job was already started
    /// - [`Error::Io`] if the decode thread could not be spawned
    pub fn start(&mut self, listener: Arc<dyn CompletionListener>) -> Result<()> {
        if self.state != JobState::Pending {
            return Err(Error::InvalidState(format!(
                "job {} already started (state {:?})",
                self.id, self.state
            )));
        }

        let engine = self.engine.take().ok_or_else(|| {
            Error::InvalidState(format!("job {} has no decode engine", self.id))
        })?;

        let job_id = self.id;
        let source = self.source.clone();
        let sink = Arc::clone(&self.sink);
        let token = CompletionToken::new(job_id);

        debug!(
            "Starting decode job {} ({} engine): {}",
            job_id,
            engine.name(),
            source.display()
        );

        thread::Builder::new()
            .name(format!("decode-{}", &job_id.simple().to_string()[..8]))
            .spawn(move || {
                let outcome = run_decode(job_id, &source, engine, sink.as_ref());
                listener.on_job_terminal(token, outcome);
            })?;

        self.state = JobState::Decoding;
        Ok(())
    }

    /// Record the terminal state reported by the decode thread
    pub(crate) fn mark_terminal(&mut self, outcome: &JobOutcome) {
        self.state = outcome.terminal_state();
    }
}

impl fmt::Debug for DecodeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeJob")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("state", &self.state)
            .finish()
    }
}

/// Decode thread body: pull buffers until the engine finishes or fails.
///
/// Panics inside the engine are converted into a failed outcome so the terminal
/// report is always sent.
fn run_decode(
    job_id: Uuid,
    source: &Path,
    mut engine: Box<dyn DecodeEngine>,
    sink: &dyn BufferSink,
) -> JobOutcome {
    let decode_start = Instant::now();
    let mut buffers = 0u64;
    let mut dropped = 0u64;

    let result = catch_unwind(AssertUnwindSafe(|| -> Result<()> {
        while let Some(buffer) = engine.produce_next_buffer()? {
            buffers += 1;
            if !sink.write(buffer) {
                dropped += 1;
            }
        }
        Ok(())
    }));

    let filename = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>");

    match result {
        Ok(Ok(())) => {
            info!(
                "Decode job completed: {} (job_id={}, buffers={}, dropped={}, elapsed={:.2}s)",
                filename,
                job_id,
                buffers,
                dropped,
                decode_start.elapsed().as_secs_f64()
            );
            JobOutcome::Finished { buffers }
        }
        Ok(Err(error)) => {
            engine.cancel();
            warn!(
                "Decode job failed: {} (job_id={}, after {} buffers): {}",
                filename, job_id, buffers, error
            );
            JobOutcome::Failed { error, buffers }
        }
        Err(panic_payload) => {
            engine.cancel();
            let panic_msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic in decoder".to_string()
            };
            warn!(
                "Decode job panicked: {} (job_id={}): {}",
                filename, job_id, panic_msg
            );
            JobOutcome::Failed {
                error: Error::Decode(format!("decoder panicked: {}", panic_msg)),
                buffers,
            }
        }
    }
}
