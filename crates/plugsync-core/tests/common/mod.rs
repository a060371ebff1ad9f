// Shared fixtures for the lifecycle test suites.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use plugsync_api::{AccountClient, MemoryAccount, SimDevice};
use plugsync_core::{Credentials, EntityChange, Manager, ManagerConfig};
use secrecy::SecretString;
use tokio::sync::broadcast;

pub const USER: &str = "user@example.com";
pub const PASS: &str = "hunter2";

pub fn config() -> ManagerConfig {
    ManagerConfig {
        call_timeout: Duration::from_secs(1),
        ..ManagerConfig::default().with_credentials(Credentials::new(USER, PASS))
    }
}

pub fn account() -> MemoryAccount {
    MemoryAccount::new(USER, PASS)
}

/// Two plugs: `a` is a single-channel plug with telemetry, `b` a
/// three-channel strip whose last channel is USB.
pub fn two_plugs() -> MemoryAccount {
    account()
        .with_device(
            "a",
            SimDevice::plug("Desk lamp (mss310)", 1).with_telemetry(12_000.0, 55.0, 2301.0),
        )
        .with_device("b", SimDevice::plug("Strip (mss425)", 3).with_usb_channel(2))
}

pub fn manager(account: &MemoryAccount) -> Manager {
    manager_with(account, config())
}

pub fn manager_with(account: &MemoryAccount, config: ManagerConfig) -> Manager {
    Manager::new(config, Arc::new(account.clone()))
}

/// Connect the account directly, for tests that drive cycles by hand.
pub async fn connect(account: &MemoryAccount) {
    let secret = SecretString::from(PASS.to_owned());
    account.connect(USER, &secret).await.unwrap();
}

/// Drain everything currently queued on a change receiver.
pub fn drain(rx: &mut broadcast::Receiver<EntityChange>) -> Vec<EntityChange> {
    let mut out = Vec::new();
    while let Ok(change) = rx.try_recv() {
        out.push(change);
    }
    out
}
