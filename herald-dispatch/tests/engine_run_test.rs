//! End-to-end dispatch runs against the engine facade
//!
//! Exercises the properties the engine guarantees:
//! 1. Quota enforcement over the trailing window, with backoff and recovery
//! 2. No recipient loss: everything ends in exactly one queue
//! 3. Round-robin identity rotation
//! 4. Requeue ordering after failures
//! 5. Pause/resume semantics around an in-flight send
//! 6. Render errors cycling recipients without reaching the transport
//! 7. Restart resumability without re-sending completed work
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime},
};

use herald_common::{EventKind, Recipient, RunState, SendJob, SenderIdentity};
use herald_dispatch::{Engine, EngineSettings, ManualClock, MockTransport, TransportError};
use herald_store::{MemoryStateStore, StateStore};

const WAIT: Duration = Duration::from_secs(10);

fn test_settings(daily_limit: usize) -> EngineSettings {
    EngineSettings {
        daily_limit,
        identity_backoff_secs: 1,
        pause_poll_millis: 10,
        event_log_capacity: 1000,
        event_channel_capacity: 64,
    }
}

fn recipients(n: usize) -> Vec<Recipient> {
    (1..=n)
        .map(|i| Recipient::new(format!("r{i}@example.com"), format!("R{i}"), ""))
        .collect()
}

struct Harness {
    engine: Engine,
    transport: MockTransport,
    clock: ManualClock,
}

async fn harness(daily_limit: usize) -> Harness {
    let store = Arc::new(MemoryStateStore::new());
    let transport = MockTransport::new();
    let clock = ManualClock::new(SystemTime::now());

    let engine = Engine::restore_with_clock(
        store as Arc<dyn StateStore>,
        Arc::new(transport.clone()),
        test_settings(daily_limit),
        Arc::new(clock.clone()),
    )
    .await
    .expect("engine should restore from an empty store");

    Harness {
        engine,
        transport,
        clock,
    }
}

/// Poll an async condition until it holds or the deadline passes.
async fn wait_for<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {what}"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_run_completes_every_recipient() {
    let h = harness(100).await;
    h.engine
        .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
        .await
        .unwrap();
    let imported = h.engine.import_recipients(recipients(5)).await;
    assert_eq!(imported, 5);

    h.engine
        .submit_job(SendJob::new("Hi {name}", "Dear {real_name}, hello.", 0))
        .await
        .unwrap();

    h.transport.wait_for_sends(5, WAIT).await.unwrap();
    wait_for("the run to go idle", || async {
        h.engine.state() == RunState::Idle
    })
    .await;

    assert_eq!(h.engine.completed_count().await, 5);
    assert_eq!(h.engine.pending_count().await, 0);

    // Rendering used the recipient's own fields.
    let sent = h.transport.sent();
    assert_eq!(sent[0].subject, "Hi R1");
    assert_eq!(sent[0].body, "Dear R1, hello.");

    // Five successes plus job lifecycle events in the log.
    let events = h.engine.replay_events(100).await;
    let successes = events
        .iter()
        .filter(|e| e.kind == EventKind::Success)
        .count();
    assert_eq!(successes, 5);
    assert!(events.iter().any(|e| e.message.contains("finished")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_quota_limits_then_window_roll_recovers() {
    let h = harness(3).await;
    h.engine
        .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
        .await
        .unwrap();
    h.engine.import_recipients(recipients(5)).await;

    h.engine
        .submit_job(SendJob::new("Subject", "Body", 0))
        .await
        .unwrap();

    // The first three go out, then the identity is spent.
    h.transport.wait_for_sends(3, WAIT).await.unwrap();
    wait_for("the worker to report quota exhaustion", || async {
        h.engine
            .replay_events(1000)
            .await
            .iter()
            .any(|e| e.kind == EventKind::Info && e.message.contains("daily limit"))
    })
    .await;

    assert_eq!(h.transport.sent_count(), 3);
    assert_eq!(h.engine.completed_count().await, 3);
    assert_eq!(h.engine.pending_count().await, 2);
    assert_eq!(
        h.engine.usage_summary().await,
        vec![("sender@example.com".to_string(), 3)]
    );

    // Age the window out; the identity becomes available again and the
    // remaining two recipients drain in their preserved order.
    h.clock.advance(Duration::from_secs(24 * 60 * 60 + 1));

    h.transport.wait_for_sends(5, WAIT).await.unwrap();
    wait_for("the run to go idle", || async {
        h.engine.state() == RunState::Idle
    })
    .await;

    assert_eq!(h.engine.completed_count().await, 5);
    assert_eq!(h.engine.pending_count().await, 0);

    let sent = h.transport.sent();
    let order: Vec<&str> = sent.iter().map(|m| m.recipient.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "r1@example.com",
            "r2@example.com",
            "r3@example.com",
            "r4@example.com",
            "r5@example.com"
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_round_robin_spreads_load_evenly() {
    let h = harness(10).await;
    for address in ["a@example.com", "b@example.com", "c@example.com"] {
        h.engine
            .upsert_identity(SenderIdentity::new(address, "secret"))
            .await
            .unwrap();
    }
    h.engine.import_recipients(recipients(9)).await;

    h.engine
        .submit_job(SendJob::new("Subject", "Body", 0))
        .await
        .unwrap();
    h.transport.wait_for_sends(9, WAIT).await.unwrap();

    let sent = h.transport.sent();
    let identities: Vec<&str> = sent.iter().map(|m| m.identity.as_str()).collect();

    // Strict rotation order, three sends each.
    assert_eq!(
        identities,
        vec![
            "a@example.com",
            "b@example.com",
            "c@example.com",
            "a@example.com",
            "b@example.com",
            "c@example.com",
            "a@example.com",
            "b@example.com",
            "c@example.com",
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_recipient_requeues_to_tail() {
    let h = harness(100).await;
    h.engine
        .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
        .await
        .unwrap();
    h.engine.import_recipients(recipients(3)).await;

    // r1's first attempt fails; every other attempt succeeds.
    h.transport.push_outcome(Err(TransportError::Connection(
        "connection refused".to_string(),
    )));

    h.engine
        .submit_job(SendJob::new("Subject", "Body", 0))
        .await
        .unwrap();

    h.transport.wait_for_sends(3, WAIT).await.unwrap();
    wait_for("the run to go idle", || async {
        h.engine.state() == RunState::Idle
    })
    .await;

    // r1 was demoted behind r2 and r3, not reinserted at its old position.
    let sent = h.transport.sent();
    let order: Vec<&str> = sent.iter().map(|m| m.recipient.as_str()).collect();
    assert_eq!(
        order,
        vec!["r2@example.com", "r3@example.com", "r1@example.com"]
    );

    // Nothing was lost, and the failure surfaced as an error event.
    assert_eq!(h.engine.completed_count().await, 3);
    assert_eq!(h.engine.pending_count().await, 0);
    let events = h.engine.replay_events(100).await;
    assert!(events.iter().any(|e| {
        e.kind == EventKind::Error && e.message.contains("connection refused")
    }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pause_lets_in_flight_send_finish() {
    let h = harness(100).await;
    h.engine
        .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
        .await
        .unwrap();
    h.engine.import_recipients(recipients(3)).await;

    // Hold each send open long enough to pause mid-flight.
    h.transport.set_delay(Some(Duration::from_millis(200)));

    h.engine
        .submit_job(SendJob::new("Subject", "Body", 0))
        .await
        .unwrap();

    // Pause while the first send is inside the transport.
    h.transport.wait_for_attempts(1, WAIT).await.unwrap();
    h.engine.pause().await;

    // The in-flight send completes and is recorded; nothing new starts.
    wait_for("the in-flight send to complete", || async {
        h.engine.completed_count().await == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h.transport.attempt_count(), 1);
    assert_eq!(h.engine.completed_count().await, 1);
    assert_eq!(h.engine.pending_count().await, 2);
    assert_eq!(h.engine.state(), RunState::Paused);

    // Resume drains the rest.
    h.transport.set_delay(None);
    h.engine.resume().await;
    h.transport.wait_for_sends(3, WAIT).await.unwrap();
    wait_for("the run to go idle", || async {
        h.engine.state() == RunState::Idle
    })
    .await;
    assert_eq!(h.engine.completed_count().await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_render_errors_cycle_recipients_without_sending() {
    let h = harness(100).await;
    h.engine
        .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
        .await
        .unwrap();
    h.engine.import_recipients(recipients(2)).await;

    // Unknown placeholders pass submission and fail per recipient.
    h.engine
        .submit_job(SendJob::new("Hello {unknown}", "Body", 0))
        .await
        .unwrap();

    // Each recipient keeps cycling through pending, producing error events
    // and never reaching the transport.
    wait_for("render errors to accumulate", || async {
        h.engine
            .replay_events(1000)
            .await
            .iter()
            .filter(|e| e.kind == EventKind::Error && e.message.contains("Template error"))
            .count()
            >= 4
    })
    .await;

    assert_eq!(h.transport.attempt_count(), 0);
    assert_eq!(h.engine.completed_count().await, 0);
    assert_eq!(h.engine.pending_count().await, 2);

    // Stopping the run leaves both recipients in pending: none vanished.
    h.engine.shutdown();
    wait_for("the worker to stop", || async {
        h.engine.state() == RunState::Idle
    })
    .await;
    assert_eq!(h.engine.pending_count().await, 2);
    assert_eq!(h.engine.completed_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mixed_failures_lose_nothing() {
    let h = harness(100).await;
    h.engine
        .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
        .await
        .unwrap();
    h.engine.import_recipients(recipients(4)).await;

    h.transport.fail_next(2);

    h.engine
        .submit_job(SendJob::new("Subject", "Body", 0))
        .await
        .unwrap();

    h.transport.wait_for_sends(4, WAIT).await.unwrap();
    wait_for("the run to go idle", || async {
        h.engine.state() == RunState::Idle
    })
    .await;

    // Every imported recipient ended in exactly one queue.
    assert_eq!(h.engine.completed_count().await, 4);
    assert_eq!(h.engine.pending_count().await, 0);

    let mut delivered: Vec<String> = h
        .engine
        .list_completed(0, 10)
        .await
        .into_iter()
        .map(|r| r.email)
        .collect();
    delivered.sort();
    let mut expected: Vec<String> = recipients(4).into_iter().map(|r| r.email).collect();
    expected.sort();
    assert_eq!(delivered, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_restart_resumes_without_resending() {
    let store = Arc::new(MemoryStateStore::new());
    let clock = ManualClock::new(SystemTime::now());

    // First process: deliver three recipients, then go away.
    {
        let transport = MockTransport::new();
        let engine = Engine::restore_with_clock(
            Arc::clone(&store) as Arc<dyn StateStore>,
            Arc::new(transport.clone()),
            test_settings(10),
            Arc::new(clock.clone()),
        )
        .await
        .unwrap();

        engine
            .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
            .await
            .unwrap();
        engine.import_recipients(recipients(3)).await;
        engine
            .submit_job(SendJob::new("Subject", "Body", 0))
            .await
            .unwrap();
        transport.wait_for_sends(3, WAIT).await.unwrap();
        wait_for("the first run to go idle", || async {
            engine.state() == RunState::Idle
        })
        .await;
    }

    // Second process over the same store.
    let transport = MockTransport::new();
    let engine = Engine::restore_with_clock(
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::new(transport.clone()),
        test_settings(10),
        Arc::new(clock.clone()),
    )
    .await
    .unwrap();

    // Completed work, the identity registry, and usage all survived.
    assert_eq!(engine.completed_count().await, 3);
    assert_eq!(engine.pending_count().await, 0);
    assert_eq!(engine.identities().await.len(), 1);
    assert_eq!(
        engine.usage_summary().await,
        vec![("sender@example.com".to_string(), 3)]
    );

    // New work only sends to the new recipients.
    engine
        .import_recipients(vec![
            Recipient::new("new1@example.com", "", ""),
            Recipient::new("new2@example.com", "", ""),
        ])
        .await;
    engine
        .submit_job(SendJob::new("Subject", "Body", 0))
        .await
        .unwrap();
    transport.wait_for_sends(2, WAIT).await.unwrap();

    let sent: Vec<String> = transport
        .sent()
        .iter()
        .map(|m| m.recipient.clone())
        .collect();
    assert_eq!(sent, vec!["new1@example.com", "new2@example.com"]);
    wait_for("the second run to go idle", || async {
        engine.state() == RunState::Idle
    })
    .await;
    assert_eq!(engine.completed_count().await, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_live_subscribers_see_progress() {
    let h = harness(100).await;
    h.engine
        .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
        .await
        .unwrap();
    h.engine.import_recipients(recipients(2)).await;

    let mut stream = h.engine.subscribe_events();

    h.engine
        .submit_job(SendJob::new("Subject", "Body", 1))
        .await
        .unwrap();

    // The acceptance event, then two successes, arrive live and in order.
    let first = stream.recv().await.unwrap();
    assert!(first.message.contains("accepted"));

    let mut successes = 0;
    while successes < 2 {
        let event = tokio::time::timeout(WAIT, stream.recv())
            .await
            .expect("event stream should stay live")
            .unwrap();
        if event.kind == EventKind::Success {
            successes += 1;
        }
    }

    // Replay serves the same history to a late subscriber.
    let replayed = h.engine.replay_events(10).await;
    assert!(replayed.iter().any(|e| e.kind == EventKind::Success));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_job_queues_behind_active_one() {
    let h = harness(100).await;
    h.engine
        .upsert_identity(SenderIdentity::new("sender@example.com", "secret"))
        .await
        .unwrap();
    h.engine.import_recipients(recipients(2)).await;

    h.transport.set_delay(Some(Duration::from_millis(100)));

    let first = h
        .engine
        .submit_job(SendJob::new("First {name}", "Body", 0))
        .await
        .unwrap();
    let second = h
        .engine
        .submit_job(SendJob::new("Second {name}", "Body", 0))
        .await
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(h.engine.queued_jobs(), 2);

    h.transport.set_delay(None);

    // The first job drains both recipients; the second finds nothing
    // pending and retires immediately after it.
    h.transport.wait_for_sends(2, WAIT).await.unwrap();
    wait_for("both jobs to retire", || async {
        h.engine.queued_jobs() == 0
    })
    .await;

    let sent = h.transport.sent();
    assert!(sent.iter().all(|m| m.subject.starts_with("First")));
}
