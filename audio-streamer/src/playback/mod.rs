//! Decode jobs and the playback queue

pub mod job;
pub mod queue;

pub use job::{BufferSink, CompletionListener, CompletionToken, DecodeJob, JobOutcome, JobState};
pub use queue::{JobSnapshot, PlaybackQueue};
