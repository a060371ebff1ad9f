#![allow(clippy::unwrap_used)]
// Command dispatcher: `set_channel` contract and failure paths.

mod common;

use plugsync_api::{Error, Fault, Op};
use plugsync_core::CoreError;

use common::{connect, manager, two_plugs};

#[tokio::test]
async fn unknown_device_is_not_found_and_registry_unchanged() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();
    let before = mgr.devices_snapshot();

    let err = mgr.set_channel("unknown-id", 0, true).await.unwrap_err();

    assert_eq!(
        err,
        CoreError::DeviceNotFound {
            device_id: "unknown-id".into()
        }
    );
    assert!(std::sync::Arc::ptr_eq(&before, &mgr.devices_snapshot()));
}

#[tokio::test]
async fn successful_command_is_visible_immediately() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();

    for channel in 0..3 {
        mgr.set_channel("b", channel, true).await.unwrap();
        assert_eq!(mgr.device("b").unwrap().is_on(channel), Some(true));
        assert_eq!(acct.channel_state("b", channel), Some(true));
    }
}

#[tokio::test]
async fn device_without_session_is_not_found() {
    let acct = two_plugs();
    connect(&acct).await;
    acct.inject(
        Some("a"),
        Op::OpenSession,
        Fault::Error(Error::Connectivity {
            message: "refused".into(),
        }),
    );
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();

    let err = mgr.set_channel("a", 0, true).await.unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));
}

#[tokio::test]
async fn unavailable_device_fails_fast() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();
    acct.set_online("a", false);
    mgr.discover().await.unwrap();

    let err = mgr.set_channel("a", 0, true).await.unwrap_err();

    assert!(matches!(err, CoreError::DeviceUnavailable { .. }));
    assert_eq!(acct.call_count(Some("a"), Op::SetChannel(0)), 0);
}

#[tokio::test]
async fn inactive_session_marks_unavailable() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();
    acct.invalidate_sessions();

    let err = mgr.set_channel("a", 0, true).await.unwrap_err();

    assert!(matches!(err, CoreError::DeviceUnavailable { .. }));
    assert!(!mgr.device("a").unwrap().available);
}

#[tokio::test]
async fn out_of_range_channel_is_rejected() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();

    let err = mgr.set_channel("a", 1, true).await.unwrap_err();

    assert_eq!(
        err,
        CoreError::InvalidChannel {
            device_id: "a".into(),
            channel: 1,
            channel_count: 1,
        }
    );
    assert_eq!(acct.call_count(Some("a"), Op::SetChannel(1)), 0);
}

#[tokio::test]
async fn remote_failure_leaves_cache_untouched() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();
    mgr.refresh().await;

    acct.inject(
        Some("a"),
        Op::SetChannel(0),
        Fault::Error(Error::Connectivity {
            message: "nack".into(),
        }),
    );
    let err = mgr.set_channel("a", 0, true).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(mgr.device("a").unwrap().is_on(0), Some(false));
    // A failed command says nothing about reachability.
    assert!(mgr.device("a").unwrap().available);
}

#[tokio::test(start_paused = true)]
async fn hung_command_times_out() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();

    acct.inject(Some("a"), Op::SetChannel(0), Fault::Hang);
    let err = mgr.set_channel("a", 0, true).await.unwrap_err();

    assert_eq!(err, CoreError::Timeout { timeout_ms: 1000 });
    assert_eq!(mgr.device("a").unwrap().is_on(0), None);
}
