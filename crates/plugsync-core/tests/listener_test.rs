#![allow(clippy::unwrap_used)]
// Push event application.

mod common;

use plugsync_api::SimDevice;
use plugsync_core::{DeviceId, PushEvent, PushOutcome};

use common::{account, connect, manager, two_plugs};

#[tokio::test]
async fn channel_push_applies_immediately() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();
    mgr.set_channel("a", 0, true).await.unwrap();

    let outcome = mgr.apply_push_event(&PushEvent::ChannelStateChanged {
        device_id: DeviceId::from("a"),
        channel: 0,
        on: false,
    });

    assert_eq!(outcome, PushOutcome::Applied);
    assert_eq!(mgr.device("a").unwrap().is_on(0), Some(false));
}

#[tokio::test]
async fn out_of_range_channel_push_is_ignored() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();

    let outcome = mgr.apply_push_event(&PushEvent::ChannelStateChanged {
        device_id: DeviceId::from("a"),
        channel: 5,
        on: true,
    });

    assert_eq!(outcome, PushOutcome::Ignored);
    assert!(mgr.device("a").unwrap().channel_state.is_empty());
}

#[tokio::test]
async fn online_push_updates_known_device() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();

    let offline = PushEvent::DeviceOnlineStatusChanged {
        device_id: DeviceId::from("b"),
        online: false,
    };
    assert_eq!(mgr.apply_push_event(&offline), PushOutcome::Applied);
    assert!(!mgr.device("b").unwrap().available);

    let online = PushEvent::DeviceOnlineStatusChanged {
        device_id: DeviceId::from("b"),
        online: true,
    };
    assert_eq!(mgr.apply_push_event(&online), PushOutcome::Applied);
    assert!(mgr.device("b").unwrap().available);
}

#[tokio::test]
async fn unprobed_device_coming_online_requests_discovery() {
    let acct = account().with_device("o", SimDevice::plug("Strip", 4).offline());
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();
    assert_eq!(mgr.device("o").unwrap().channel_count, 1);

    acct.set_online("o", true);
    let online = PushEvent::DeviceOnlineStatusChanged {
        device_id: DeviceId::from("o"),
        online: true,
    };
    assert_eq!(mgr.apply_push_event(&online), PushOutcome::DiscoveryTriggered);
    assert!(mgr.device("o").unwrap().available);

    // The requested pass learns the real channel count.
    mgr.discover().await.unwrap();
    let o = mgr.device("o").unwrap();
    assert!(o.probed);
    assert_eq!(o.channel_count, 4);
}

#[tokio::test]
async fn unknown_device_online_requests_discovery() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();

    let online = PushEvent::DeviceOnlineStatusChanged {
        device_id: DeviceId::from("new"),
        online: true,
    };
    assert_eq!(mgr.apply_push_event(&online), PushOutcome::DiscoveryTriggered);
    // Nothing created inline.
    assert!(mgr.device("new").is_none());

    let offline = PushEvent::DeviceOnlineStatusChanged {
        device_id: DeviceId::from("new"),
        online: false,
    };
    assert_eq!(mgr.apply_push_event(&offline), PushOutcome::Ignored);
}

#[tokio::test]
async fn online_push_without_live_session_requests_discovery() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();
    acct.invalidate_sessions();

    let online = PushEvent::DeviceOnlineStatusChanged {
        device_id: DeviceId::from("a"),
        online: true,
    };
    assert_eq!(mgr.apply_push_event(&online), PushOutcome::DiscoveryTriggered);
}

#[tokio::test]
async fn connection_events_are_informational() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);
    mgr.discover().await.unwrap();
    let before = mgr.devices_snapshot();

    let outcome = mgr.apply_push_event(&PushEvent::ConnectionStateChanged { connected: false });

    assert_eq!(outcome, PushOutcome::Ignored);
    assert!(std::sync::Arc::ptr_eq(&before, &mgr.devices_snapshot()));
}

#[tokio::test]
async fn push_for_unknown_device_channel_is_ignored() {
    let acct = two_plugs();
    connect(&acct).await;
    let mgr = manager(&acct);

    let outcome = mgr.apply_push_event(&PushEvent::ChannelStateChanged {
        device_id: DeviceId::from("ghost"),
        channel: 0,
        on: true,
    });
    assert_eq!(outcome, PushOutcome::Ignored);
    assert!(mgr.registry().is_empty());
}
