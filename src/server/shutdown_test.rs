//! Tests for graceful shutdown handling

use super::shutdown::*;
use std::time::Duration;

#[tokio::test]
async fn test_signal_fires_for_every_clone() {
    let (controller, signal) = shutdown_channel();
    let clones: Vec<ShutdownSignal> = (0..3).map(|_| signal.clone()).collect();
    assert!(clones.iter().all(|s| !s.is_shutdown()));

    controller.shutdown();

    assert!(signal.is_shutdown());
    assert!(clones.iter().all(ShutdownSignal::is_shutdown));
}

#[tokio::test]
async fn test_wait_returns_after_shutdown() {
    let (controller, mut signal) = shutdown_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.shutdown();
    });

    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;
    assert!(result.is_ok(), "wait() should return once shutdown is sent");
    assert!(signal.is_shutdown());
}

#[tokio::test]
async fn test_dropped_controller_releases_waiters() {
    let (controller, mut signal) = shutdown_channel();
    drop(controller);

    let result = tokio::time::timeout(Duration::from_secs(1), signal.wait()).await;
    assert!(result.is_ok(), "a dropped controller must not strand waiters");
}

#[tokio::test]
async fn test_wait_is_immediate_when_already_shut_down() {
    let (controller, mut signal) = shutdown_channel();
    controller.shutdown();

    let result = tokio::time::timeout(Duration::from_millis(10), signal.wait()).await;
    assert!(result.is_ok());
}
