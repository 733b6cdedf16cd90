//! Contract Test: Cancellation Latency
//!
//! Constraints verified:
//! - A cancelled scheduler completes cleanly (Ok, not an error)
//! - Cancellation is observed at the top of every cycle, not after a full period
//! - An in-flight browse is allowed to finish within its budget
//! - The change stream closes when the scheduler completes
//!
//! If this test fails, someone has added:
//! - A sleep that ignores the cancellation token
//! - A cycle that starts after cancellation was signalled
//! - A sender kept alive past the scheduler

mod common;

use common::*;
use std::time::Duration;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use zcnotify_core::ScanScheduler;

#[tokio::test]
async fn pre_cancelled_scheduler_never_browses() {
    let discoverer = ScriptedDiscoverer::empty();
    let (scheduler, _events_rx) = ScanScheduler::new(
        Box::new(discoverer.clone()),
        fast_settings(Duration::from_secs(60)),
    )
    .expect("scheduler construction succeeds");

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    assert_ok!(scheduler.run(shutdown).await);
    assert_eq!(discoverer.browse_call_count(), 0);
}

#[tokio::test]
async fn cancel_during_idle_period_returns_promptly() {
    // A long period: waiting it out would blow the test timeout
    let discoverer = ScriptedDiscoverer::new(vec![Scan::Found(vec![snap("A", "h1", 80, 60)])]);
    let (scheduler, mut events_rx) = ScanScheduler::new(
        Box::new(discoverer.clone()),
        fast_settings(Duration::from_secs(60)),
    )
    .expect("scheduler construction succeeds");

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));

    // First cycle runs immediately
    let first = events_rx.recv().await.expect("first cycle publishes");
    assert_eq!(first.entry.instance_key, "A");

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(result.is_ok(), "Scheduler should stop well before the next tick");
    assert_ok!(result.unwrap().unwrap());

    assert_eq!(discoverer.browse_call_count(), 1);
    assert!(events_rx.recv().await.is_none(), "change stream closes on completion");
}

#[tokio::test]
async fn cancel_during_browse_completes_within_one_period() {
    let period = Duration::from_millis(300);
    let discoverer = ScriptedDiscoverer::empty().with_latency(Duration::from_millis(150));
    let (scheduler, _events_rx) =
        ScanScheduler::new(Box::new(discoverer.clone()), fast_settings(period))
            .expect("scheduler construction succeeds");

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(shutdown.clone()));

    // Let the first browse start, then cancel mid-flight
    tokio::time::sleep(Duration::from_millis(30)).await;
    let cancelled_at = tokio::time::Instant::now();
    shutdown.cancel();

    let result = tokio::time::timeout(period * 2, handle).await;
    assert!(result.is_ok(), "Scheduler should stop within one scan period");
    assert_ok!(result.unwrap().unwrap());

    assert!(cancelled_at.elapsed() <= period + Duration::from_millis(100));
    assert_eq!(
        discoverer.browse_call_count(),
        1,
        "No new cycle may start after cancellation"
    );
}

#[tokio::test]
async fn zero_period_is_rejected() {
    let result = ScanScheduler::new(
        Box::new(ScriptedDiscoverer::empty()),
        fast_settings(Duration::ZERO),
    );
    assert!(result.is_err());
}
