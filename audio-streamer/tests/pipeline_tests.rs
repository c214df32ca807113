//! Integration tests for the streaming pipeline
//!
//! Drives the stream manager with scripted decode engines and a loopback session,
//! checking playback order, failure handling and service lifecycle effects on
//! buffer delivery.

mod helpers;

use audio_streamer::audio::DecoderFactory;
use audio_streamer::config::StreamConfig;
use audio_streamer::events::StreamEvent;
use audio_streamer::transport::{LoopbackSession, ServiceState};
use audio_streamer::{Error, StreamManager};
use helpers::*;
use std::sync::Arc;

fn scripted_manager(factory: &Arc<ScriptedFactory>) -> (StreamManager, Arc<LoopbackSession>) {
    let session = Arc::new(LoopbackSession::in_memory());
    let factory: Arc<dyn DecoderFactory> = factory.clone();
    let manager = StreamManager::with_factory(session.clone(), &StreamConfig::default(), factory)
        .expect("default stream config is valid");
    (manager, session)
}

fn tags(session: &LoopbackSession) -> Vec<u8> {
    session.records().iter().map(|r| r.data[0]).collect()
}

#[tokio::test]
async fn test_failed_head_does_not_stop_queue() {
    let factory = ScriptedFactory::new();
    factory.register("a.mp3", Script::failing(1, 2));
    factory.register("b.mp3", Script::finishing(2, 3));
    factory.register("c.mp3", Script::finishing(3, 3));

    let (manager, session) = scripted_manager(&factory);
    let mut events = manager.subscribe();
    start_and_wait_active(&manager, false).await;

    let a = manager.submit("/music/a.mp3").unwrap();
    let b = manager.submit("/music/b.mp3").unwrap();
    let c = manager.submit("/music/c.mp3").unwrap();
    wait_idle(&manager).await;

    // A delivers 2 buffers, then B and C in full, never interleaved
    assert_eq!(tags(&session), vec![1, 1, 2, 2, 2, 3, 3, 3]);

    let events = drain_events(&mut events);
    let position = |wanted: &dyn Fn(&StreamEvent) -> bool| {
        events
            .iter()
            .position(|e| wanted(e))
            .expect("event not observed")
    };

    let a_failed = position(&|e| matches!(e, StreamEvent::JobFailed { job_id, .. } if *job_id == a));
    let b_started = position(&|e| matches!(e, StreamEvent::JobStarted { job_id, .. } if *job_id == b));
    let b_finished =
        position(&|e| matches!(e, StreamEvent::JobFinished { job_id, buffers: 3 } if *job_id == b));
    let c_started = position(&|e| matches!(e, StreamEvent::JobStarted { job_id, .. } if *job_id == c));
    let c_finished =
        position(&|e| matches!(e, StreamEvent::JobFinished { job_id, buffers: 3 } if *job_id == c));

    assert!(a_failed < b_started);
    assert!(b_started < b_finished);
    assert!(b_finished < c_started);
    assert!(c_started < c_finished);

    assert_eq!(factory.max_concurrent(), 1);
}

#[tokio::test]
async fn test_buffers_within_job_are_monotonic() {
    let factory = ScriptedFactory::new();
    factory.register("a.wav", Script::finishing(7, 10));

    let (manager, session) = scripted_manager(&factory);
    start_and_wait_active(&manager, false).await;

    manager.submit("a.wav").unwrap();
    wait_idle(&manager).await;

    let pts: Vec<u64> = session
        .records()
        .iter()
        .map(|r| r.presentation_time_us)
        .collect();
    assert_eq!(pts.len(), 10);
    assert!(pts.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_many_files_play_in_submission_order() {
    let factory = ScriptedFactory::new();
    for tag in 1..=8u8 {
        factory.register(&format!("{}.flac", tag), Script::finishing(tag, tag as u32));
    }

    let (manager, session) = scripted_manager(&factory);
    start_and_wait_active(&manager, false).await;

    for tag in 1..=8u8 {
        manager.submit(format!("{}.flac", tag)).unwrap();
    }
    wait_idle(&manager).await;

    let expected: Vec<u8> = (1..=8u8)
        .flat_map(|tag| std::iter::repeat(tag).take(tag as usize))
        .collect();
    assert_eq!(tags(&session), expected);
    assert_eq!(factory.max_concurrent(), 1);
}

#[tokio::test]
async fn test_second_job_waits_for_first() {
    let factory = ScriptedFactory::new();
    let (a, release_a) = Script::finishing(1, 3).gated(0);
    factory.register("a.mp3", a);
    factory.register("b.mp3", Script::finishing(2, 1));

    let (manager, session) = scripted_manager(&factory);
    start_and_wait_active(&manager, false).await;

    manager.submit("a.mp3").unwrap();
    manager.submit("b.mp3").unwrap();

    let snapshot = manager.queue_snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].state, audio_streamer::playback::JobState::Decoding);
    assert_eq!(snapshot[1].state, audio_streamer::playback::JobState::Pending);
    assert!(session.records().is_empty());

    release_a.send(()).unwrap();
    wait_idle(&manager).await;
    assert_eq!(tags(&session), vec![1, 1, 1, 2]);
}

#[tokio::test]
async fn test_stop_service_drops_remaining_buffers() {
    let factory = ScriptedFactory::new();
    let (a, release_a) = Script::finishing(1, 5).gated(2);
    factory.register("a.mp3", a);

    let (manager, session) = scripted_manager(&factory);
    let mut events = manager.subscribe();
    start_and_wait_active(&manager, false).await;

    let job = manager.submit("a.mp3").unwrap();
    wait_for_records(&session, 2).await;

    stop_and_wait_stopped(&manager).await;
    assert!(!session.audio_stream_open());

    release_a.send(()).unwrap();
    wait_idle(&manager).await;

    // Remaining buffers are dropped by the sink; the job itself still finishes
    assert_eq!(session.records().len(), 2);
    assert_eq!(manager.delivered_buffers(), 2);
    assert_eq!(manager.dropped_buffers(), 3);

    let events = drain_events(&mut events);
    assert!(events.contains(&StreamEvent::JobFinished {
        job_id: job,
        buffers: 5
    }));
    assert!(events.contains(&StreamEvent::ServiceEnded { requested: true }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::JobFailed { .. })));
}

#[tokio::test]
async fn test_buffers_before_service_start_are_dropped() {
    let factory = ScriptedFactory::new();
    factory.register("a.mp3", Script::finishing(1, 4));

    let (manager, session) = scripted_manager(&factory);
    manager.submit("a.mp3").unwrap();
    wait_idle(&manager).await;

    assert!(session.records().is_empty());
    assert_eq!(manager.dropped_buffers(), 4);
}

#[tokio::test]
async fn test_start_service_when_disconnected_is_noop() {
    let factory = ScriptedFactory::new();
    let (manager, session) = scripted_manager(&factory);
    session.set_connected(false);

    manager.start_service(true);

    assert_eq!(*manager.service_state().borrow(), ServiceState::Stopped);
    assert_eq!(session.service_starts(), 0);
}

#[tokio::test]
async fn test_service_error_is_reported_to_observer() {
    let factory = ScriptedFactory::new();
    let (manager, session) = scripted_manager(&factory);
    let mut events = manager.subscribe();
    start_and_wait_active(&manager, true).await;

    let mut state = manager.service_state();
    session.inject_error("link dropped");
    tokio::time::timeout(TEST_TIMEOUT, state.wait_for(|s| *s == ServiceState::Stopped))
        .await
        .unwrap()
        .unwrap();

    let events = drain_events(&mut events);
    assert!(events.contains(&StreamEvent::ServiceStarted { encrypted: true }));
    assert!(events.contains(&StreamEvent::ServiceError {
        reason: "link dropped".to_string()
    }));
    // No automatic retry
    assert_eq!(session.service_starts(), 1);
}

#[tokio::test]
async fn test_restart_after_requested_stop() {
    let factory = ScriptedFactory::new();
    factory.register("b.mp3", Script::finishing(2, 2));

    let (manager, session) = scripted_manager(&factory);
    start_and_wait_active(&manager, false).await;
    stop_and_wait_stopped(&manager).await;
    start_and_wait_active(&manager, false).await;

    manager.submit("b.mp3").unwrap();
    wait_idle(&manager).await;

    assert_eq!(session.service_starts(), 2);
    assert_eq!(tags(&session), vec![2, 2]);
}

#[tokio::test]
async fn test_unsupported_format_fails_configuration() {
    let session = Arc::new(LoopbackSession::in_memory());
    let config = StreamConfig {
        sample_rate: "11KHZ".to_string(),
        ..Default::default()
    };

    let result = StreamManager::configure(session, &config);
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
}
