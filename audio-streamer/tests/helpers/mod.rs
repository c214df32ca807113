//! Test helper modules for audio-streamer integration tests
//!
//! Provides reusable test infrastructure components:
//! - Scripted decode engines with a fixed buffer count and optional failure
//! - WAV file generation for real-decoder tests
//! - Small async wait utilities

#![allow(dead_code)]

pub mod audio_generator;
pub mod scripted;

pub use audio_generator::{generate_silent_wav, generate_sine_wav};
pub use scripted::{Script, ScriptedFactory};

use audio_streamer::events::StreamEvent;
use audio_streamer::transport::{LoopbackSession, ServiceState};
use audio_streamer::StreamManager;
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound for any single wait in these tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the audio service and wait until it is active
pub async fn start_and_wait_active(manager: &StreamManager, encrypted: bool) {
    let mut state = manager.service_state();
    manager.start_service(encrypted);
    tokio::time::timeout(TEST_TIMEOUT, state.wait_for(|s| *s == ServiceState::Active))
        .await
        .expect("service did not become active")
        .expect("state channel closed");
}

/// Stop the audio service and wait until it is stopped
pub async fn stop_and_wait_stopped(manager: &StreamManager) {
    let mut state = manager.service_state();
    manager.stop_service();
    tokio::time::timeout(TEST_TIMEOUT, state.wait_for(|s| *s == ServiceState::Stopped))
        .await
        .expect("service did not stop")
        .expect("state channel closed");
}

/// Wait for the queue to drain
pub async fn wait_idle(manager: &StreamManager) {
    tokio::time::timeout(TEST_TIMEOUT, manager.wait_idle())
        .await
        .expect("queue did not drain");
}

/// Poll until the loopback session has received `count` buffers
pub async fn wait_for_records(session: &LoopbackSession, count: usize) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while session.records().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sink never received the expected buffers");
}

/// All events currently buffered on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
