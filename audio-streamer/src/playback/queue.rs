//! Playback queue
//!
//! FIFO of decode jobs with at most one job decoding at a time. The head of the
//! queue is the only job that may be in [`JobState::Decoding`]; every other entry is
//! [`JobState::Pending`].
//!
//! All queue mutations run under a single mutex held only for the state transition.
//! Decode work happens on the job's own thread, outside the lock.

use super::job::{CompletionListener, CompletionToken, DecodeJob, JobOutcome, JobState};
use crate::error::{Error, Result};
use crate::events::{EventBus, StreamEvent};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Point-in-time view of one queued job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub source: PathBuf,
    pub state: JobState,
}

struct QueueInner {
    jobs: VecDeque<DecodeJob>,

    /// Set once a terminal report did not match the head; the queue then stops
    corrupted: bool,
}

struct QueueShared {
    inner: Mutex<QueueInner>,
    events: EventBus,
    len_tx: watch::Sender<usize>,
}

/// Ordered, single-active-decode job queue
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    shared: Arc<QueueShared>,
}

impl PlaybackQueue {
    pub fn new(events: EventBus) -> Self {
        let (len_tx, _) = watch::channel(0);

        Self {
            shared: Arc::new(QueueShared {
                inner: Mutex::new(QueueInner {
                    jobs: VecDeque::new(),
                    corrupted: false,
                }),
                events,
                len_tx,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job to the tail. If the queue was empty, the job starts decoding
    /// before this returns. Never waits for decoding.
    ///
    /// # Errors
    /// [`Error::QueueCorruption`] if the queue has detected a corrupted head.
    pub fn submit(&self, job: DecodeJob) -> Result<Uuid> {
        let job_id = job.id();
        let source = job.source().to_path_buf();

        let mut inner = self.lock();
        if inner.corrupted {
            return Err(Error::QueueCorruption(
                "playback queue stopped after an invariant violation".to_string(),
            ));
        }

        let was_empty = inner.jobs.is_empty();
        inner.jobs.push_back(job);

        debug!(
            "Enqueued job {} at position {}: {}",
            job_id,
            inner.jobs.len() - 1,
            source.display()
        );
        self.shared
            .events
            .emit_lossy(StreamEvent::JobQueued { job_id, source });

        if was_empty {
            self.start_head(&mut inner);
        }

        self.publish_len(&inner);
        Ok(job_id)
    }

    /// Handle the terminal report of the job at the head.
    ///
    /// Removes the head, then starts the new head if there is one.
    ///
    /// # Errors
    /// [`Error::QueueCorruption`] if the reporting job is not the head. The queue
    /// refuses all further work afterwards.
    pub fn on_job_terminal(&self, token: CompletionToken, outcome: JobOutcome) -> Result<()> {
        let job_id = token.job_id();
        let mut inner = self.lock();

        if inner.corrupted {
            return Err(Error::QueueCorruption(format!(
                "terminal report for job {} after queue corruption",
                job_id
            )));
        }

        let head_id = inner.jobs.front().map(|job| job.id());
        if head_id != Some(job_id) {
            inner.corrupted = true;
            let detail = format!(
                "job {} reported completion but queue head is {:?}",
                job_id, head_id
            );
            error!("Playback queue corrupted: {}", detail);
            self.shared.events.emit_lossy(StreamEvent::QueueCorrupted {
                detail: detail.clone(),
            });
            return Err(Error::QueueCorruption(detail));
        }

        if let Some(mut finished) = inner.jobs.pop_front() {
            finished.mark_terminal(&outcome);

            match outcome {
                JobOutcome::Finished { buffers } => {
                    self.shared
                        .events
                        .emit_lossy(StreamEvent::JobFinished { job_id, buffers });
                }
                JobOutcome::Failed { error, buffers } => {
                    warn!(
                        "Dropping failed job {} after {} buffers: {}",
                        job_id, buffers, error
                    );
                    self.shared.events.emit_lossy(StreamEvent::JobFailed {
                        job_id,
                        source: finished.source().to_path_buf(),
                        error: error.to_string(),
                    });
                }
            }
        }

        self.start_head(&mut inner);
        self.publish_len(&inner);
        Ok(())
    }

    /// Start the head job if it is pending. A head that cannot start is dropped as
    /// failed and the next one is tried.
    fn start_head(&self, inner: &mut QueueInner) {
        while let Some(head) = inner.jobs.front_mut() {
            if head.state() != JobState::Pending {
                return;
            }

            let listener: Arc<dyn CompletionListener> = Arc::new(self.clone());
            match head.start(listener) {
                Ok(()) => {
                    info!("Decoding {} (job_id={})", head.source().display(), head.id());
                    self.shared.events.emit_lossy(StreamEvent::JobStarted {
                        job_id: head.id(),
                        source: head.source().to_path_buf(),
                    });
                    return;
                }
                Err(e) => {
                    error!("Failed to start job {}: {}", head.id(), e);
                    if let Some(failed) = inner.jobs.pop_front() {
                        self.shared.events.emit_lossy(StreamEvent::JobFailed {
                            job_id: failed.id(),
                            source: failed.source().to_path_buf(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn publish_len(&self, inner: &QueueInner) {
        self.shared.len_tx.send_replace(inner.jobs.len());
    }

    /// Number of queued jobs, including the one decoding
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    /// True once an invariant violation stopped the queue
    pub fn is_corrupted(&self) -> bool {
        self.lock().corrupted
    }

    /// States of all queued jobs, head first
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.lock()
            .jobs
            .iter()
            .map(|job| JobSnapshot {
                job_id: job.id(),
                source: job.source().to_path_buf(),
                state: job.state(),
            })
            .collect()
    }

    /// Watch the queue length
    pub fn subscribe_len(&self) -> watch::Receiver<usize> {
        self.shared.len_tx.subscribe()
    }

    /// Wait until every queued job has reached a terminal state
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe_len();
        let _ = rx.wait_for(|len| *len == 0).await;
    }
}

impl CompletionListener for PlaybackQueue {
    fn on_job_terminal(&self, token: CompletionToken, outcome: JobOutcome) {
        if let Err(e) = PlaybackQueue::on_job_terminal(self, token, outcome) {
            error!("Queue rejected terminal report: {}", e);
        }
    }
}
