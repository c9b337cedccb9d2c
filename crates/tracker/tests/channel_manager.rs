//! Behaviour of [`UpdateChannelManager`]: reconnection budget, idle
//! detection and explicit close, against a scripted connector.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use docsight_tracker::{
    ChannelConfig, ChannelEvent, ChannelState, DisconnectReason, UpdateChannelManager,
};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

use common::{settle, ts, FakeConnector};

fn manager(connector: &std::sync::Arc<FakeConnector>) -> UpdateChannelManager {
    UpdateChannelManager::new(connector.clone(), ChannelConfig::default())
}

async fn next(rx: &mut UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    rx.recv().await.expect("channel task ended early")
}

// ---------------------------------------------------------------------------
// Test: three failed connects abandon the channel
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn gives_up_after_three_failed_attempts() {
    let connector = FakeConnector::new();
    let mut manager = manager(&connector);
    let start = Instant::now();

    let mut rx = manager.subscribe("d1");

    for _ in 0..3 {
        assert_matches!(
            next(&mut rx).await,
            ChannelEvent::Disconnected {
                reason: DisconnectReason::ConnectFailed(_)
            }
        );
    }
    assert_matches!(next(&mut rx).await, ChannelEvent::Abandoned { attempts: 3 });
    assert!(rx.recv().await.is_none(), "no further attempts");

    assert_eq!(connector.attempts(), 3);
    assert!(start.elapsed() >= Duration::from_secs(2), "fixed 1s delay between attempts");
    assert_eq!(manager.state(), ChannelState::Abandoned);
}

// ---------------------------------------------------------------------------
// Test: a successful open resets the failure count
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn successful_open_resets_failure_count() {
    let connector = FakeConnector::new();
    connector.fail();
    connector.fail();
    // One update, then the server closes the channel.
    let feed = connector.open();
    feed.update(json!({ "document_id": "d1", "status": "processing", "progress": 0.1 }));
    drop(feed);

    let mut manager = manager(&connector);
    let mut rx = manager.subscribe("d1");

    for _ in 0..2 {
        assert_matches!(
            next(&mut rx).await,
            ChannelEvent::Disconnected {
                reason: DisconnectReason::ConnectFailed(_)
            }
        );
    }
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);
    assert_matches!(next(&mut rx).await, ChannelEvent::Update(_));
    assert_matches!(
        next(&mut rx).await,
        ChannelEvent::Disconnected {
            reason: DisconnectReason::ClosedByServer
        }
    );

    // Full budget again: three more failures before giving up.
    for _ in 0..3 {
        assert_matches!(
            next(&mut rx).await,
            ChannelEvent::Disconnected {
                reason: DisconnectReason::ConnectFailed(_)
            }
        );
    }
    assert_matches!(next(&mut rx).await, ChannelEvent::Abandoned { attempts: 3 });
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn opens_that_close_before_any_update_use_up_the_budget() {
    let connector = FakeConnector::new();
    for _ in 0..10 {
        drop(connector.open());
    }
    let mut manager = manager(&connector);

    let mut rx = manager.subscribe("d1");
    for _ in 0..3 {
        assert_matches!(next(&mut rx).await, ChannelEvent::Connected);
        assert_matches!(
            next(&mut rx).await,
            ChannelEvent::Disconnected {
                reason: DisconnectReason::ClosedByServer
            }
        );
    }
    assert_matches!(next(&mut rx).await, ChannelEvent::Abandoned { attempts: 3 });
    assert!(rx.recv().await.is_none());
    assert_eq!(connector.attempts(), 3);
}

// ---------------------------------------------------------------------------
// Test: close() stops the channel for good
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn explicit_close_never_reconnects() {
    let connector = FakeConnector::new();
    let _feed = connector.open();
    let mut manager = manager(&connector);

    let mut rx = manager.subscribe("d1");
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);
    assert!(manager.state().is_connected());
    assert_eq!(manager.job_id(), Some("d1"));

    manager.close();
    manager.close();
    assert_eq!(manager.state(), ChannelState::Closed);
    assert!(manager.job_id().is_none());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(rx.recv().await.is_none());
    assert_eq!(connector.attempts(), 1);
    assert_eq!(connector.log(), vec!["open d1", "close d1"]);
}

#[tokio::test(start_paused = true)]
async fn resubscribe_closes_previous_channel_first() {
    let connector = FakeConnector::new();
    let _a = connector.open();
    let _b = connector.open();
    let mut manager = manager(&connector);

    let mut rx_a = manager.subscribe("a");
    assert_matches!(next(&mut rx_a).await, ChannelEvent::Connected);

    let mut rx_b = manager.subscribe("b");
    assert_matches!(next(&mut rx_b).await, ChannelEvent::Connected);
    assert!(rx_a.recv().await.is_none());

    assert_eq!(connector.log(), vec!["open a", "close a", "open b"]);
    assert_eq!(manager.job_id(), Some("b"));
}

// ---------------------------------------------------------------------------
// Test: idle timeout
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn idle_channel_emits_stale_marker_then_disconnects() {
    let connector = FakeConnector::new();
    let _feed = connector.open();
    let mut manager = manager(&connector);
    let start = Instant::now();

    let mut rx = manager.subscribe("d1");
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);

    let marker = assert_matches!(next(&mut rx).await, ChannelEvent::Update(u) => u);
    assert!(marker.is_synthetic());
    assert_eq!(marker.status.as_deref(), Some("error"));
    assert_eq!(marker.progress, Some(-1.0));
    assert!(marker.timestamp.is_none());
    assert!(start.elapsed() >= Duration::from_secs(30));

    assert_matches!(
        next(&mut rx).await,
        ChannelEvent::Disconnected {
            reason: DisconnectReason::IdleTimeout
        }
    );
    settle().await;
    assert_eq!(connector.log(), vec!["open d1", "close d1"]);
}

#[tokio::test(start_paused = true)]
async fn text_frames_push_back_the_idle_deadline() {
    let connector = FakeConnector::new();
    let feed = connector.open();
    let mut manager = manager(&connector);
    let start = Instant::now();

    let mut rx = manager.subscribe("d1");
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);

    tokio::time::sleep(Duration::from_secs(20)).await;
    feed.update(json!({
        "document_id": "d1", "status": "analyzing", "progress": 0.5, "timestamp": ts(20),
    }));
    let update = assert_matches!(next(&mut rx).await, ChannelEvent::Update(u) => u);
    assert!(!update.is_synthetic());

    let marker = assert_matches!(next(&mut rx).await, ChannelEvent::Update(u) => u);
    assert!(marker.is_synthetic());
    assert!(start.elapsed() >= Duration::from_secs(50));
}

#[tokio::test(start_paused = true)]
async fn control_frames_do_not_push_back_the_idle_deadline() {
    let connector = FakeConnector::new();
    let feed = connector.open();
    let mut manager = manager(&connector);
    let start = Instant::now();

    let mut rx = manager.subscribe("d1");
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);

    tokio::time::sleep(Duration::from_secs(20)).await;
    feed.ping();

    let marker = assert_matches!(next(&mut rx).await, ChannelEvent::Update(u) => u);
    assert!(marker.is_synthetic());
    assert!(start.elapsed() < Duration::from_secs(31));
}

// ---------------------------------------------------------------------------
// Test: frame decoding
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn double_encoded_frames_are_unwrapped() {
    let connector = FakeConnector::new();
    let feed = connector.open();
    let mut manager = manager(&connector);

    let mut rx = manager.subscribe("d1");
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);

    let inner = json!({ "document_id": "d1", "status": "analyzing", "progress": 0.7 });
    feed.text(serde_json::to_string(&inner.to_string()).unwrap());

    let update = assert_matches!(next(&mut rx).await, ChannelEvent::Update(u) => u);
    assert_eq!(update.status.as_deref(), Some("analyzing"));
    assert_eq!(update.progress, Some(0.7));
}

#[tokio::test(start_paused = true)]
async fn unparseable_frames_are_skipped() {
    let connector = FakeConnector::new();
    let feed = connector.open();
    let mut manager = manager(&connector);

    let mut rx = manager.subscribe("d1");
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);

    feed.text("definitely not json");
    feed.update(json!({ "document_id": "d1", "status": "processing", "progress": 0.2 }));

    let update = assert_matches!(next(&mut rx).await, ChannelEvent::Update(u) => u);
    assert_eq!(update.progress, Some(0.2));
}

#[tokio::test(start_paused = true)]
async fn transport_error_reports_dropped_and_reconnects() {
    let connector = FakeConnector::new();
    let first = connector.open();
    let _second = connector.open();
    let mut manager = manager(&connector);

    let mut rx = manager.subscribe("d1");
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);

    first.fail("connection reset");
    assert_matches!(
        next(&mut rx).await,
        ChannelEvent::Disconnected {
            reason: DisconnectReason::Dropped(_)
        }
    );
    assert_matches!(next(&mut rx).await, ChannelEvent::Connected);
    assert_eq!(connector.attempts(), 2);
}
