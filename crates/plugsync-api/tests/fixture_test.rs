#![allow(clippy::unwrap_used)]
// Fixture loading and session behaviour of the in-memory account.

use std::io::Write;
use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::broadcast::error::TryRecvError;

use plugsync_api::{AccountClient, DeviceId, Error, MemoryAccount, PushEvent};

const FIXTURE: &str = r#"
username = "user@example.com"
password = "hunter2"

[[devices]]
id = "1811061234"
name = "Desk lamp (mss310)"
model = "mss310"
channels = [true]
telemetry = { power = 12000.0, current = 55.0, voltage = 2301.0 }

[[devices]]
id = "1901020001"
name = "Power strip (mss425e)"
channels = [false, false, false, true]
usb_channel = 3
"#;

fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

async fn connected(account: &MemoryAccount) {
    let secret = SecretString::from("hunter2".to_owned());
    account.connect("user@example.com", &secret).await.unwrap();
}

#[tokio::test]
async fn fixture_file_round_trips_through_sessions() {
    let file = write_fixture(FIXTURE);
    let account = MemoryAccount::from_fixture_path(file.path()).unwrap();
    connected(&account).await;

    let devices = account.list_devices().await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].model.as_deref(), Some("mss310"));
    assert!(devices.iter().all(|d| d.online));

    let strip = account
        .open_session(&DeviceId::from("1901020001"))
        .await
        .unwrap();
    assert_eq!(strip.get_channel_count().await.unwrap(), 4);
    assert_eq!(strip.usb_channel_index().await.unwrap(), Some(3));
    assert!(!strip.supports_telemetry().await.unwrap());
    assert!(strip.get_channel_state(3).await.unwrap());

    let lamp = account
        .open_session(&DeviceId::from("1811061234"))
        .await
        .unwrap();
    let readings = lamp.get_telemetry().await.unwrap();
    assert_eq!(readings.get("voltage"), Some(&2301.0));
}

#[test]
fn missing_fixture_file_is_reported() {
    let err = MemoryAccount::from_fixture_path("/nonexistent/plugsync/fixture.toml").unwrap_err();
    assert!(matches!(err, Error::Fixture { .. }));
}

#[tokio::test]
async fn remote_switching_updates_state_and_pushes() {
    let account = MemoryAccount::from_fixture_str(FIXTURE).unwrap();
    let mut events = account.push_events().unwrap();
    connected(&account).await;
    assert_eq!(
        *events.try_recv().unwrap(),
        PushEvent::ConnectionStateChanged { connected: true }
    );

    let client: Arc<dyn AccountClient> = Arc::new(account.clone());
    let lamp = client
        .open_session(&DeviceId::from("1811061234"))
        .await
        .unwrap();
    lamp.set_channel_state(0, false).await.unwrap();

    assert_eq!(account.channel_state("1811061234", 0), Some(false));
    assert_eq!(
        *events.try_recv().unwrap(),
        PushEvent::ChannelStateChanged {
            device_id: DeviceId::from("1811061234"),
            channel: 0,
            on: false,
        }
    );
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn unknown_device_session_is_rejected() {
    let account = MemoryAccount::from_fixture_str(FIXTURE).unwrap();
    connected(&account).await;

    let err = account
        .open_session(&DeviceId::from("missing"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::UnknownDevice {
            device_id: "missing".into()
        }
    );
}
