//! Collaborator traits for the remote cloud account.
//!
//! The lifecycle manager never talks to a transport directly. It holds an
//! [`AccountClient`] for discovery and session management, one
//! [`DeviceSession`] per device for reads and commands, and optionally a
//! push event receiver. Every method may block for a network round trip;
//! callers are expected to wrap each call in their own timeout.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::broadcast;

use crate::error::Error;
use crate::models::{DeviceId, DeviceSummary, PushEvent, Telemetry};

/// Account-level operations: authentication, device listing, session setup.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Authenticate and establish the account session.
    ///
    /// Calling this again tears down the previous session; device sessions
    /// opened under it report `is_active() == false` afterwards.
    async fn connect(&self, username: &str, password: &SecretString) -> Result<(), Error>;

    /// Drop the account session. Never fails.
    async fn disconnect(&self);

    /// Every device visible to the account, each with its online flag.
    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, Error>;

    /// Open a session handle for one device.
    async fn open_session(&self, id: &DeviceId) -> Result<Arc<dyn DeviceSession>, Error>;

    /// Subscribe to push notifications, if the account supports them.
    fn push_events(&self) -> Option<broadcast::Receiver<Arc<PushEvent>>> {
        None
    }
}

/// Remote handle to a single device.
#[async_trait]
pub trait DeviceSession: Send + Sync + fmt::Debug {
    fn device_id(&self) -> &DeviceId;

    /// Whether the account session this handle was opened under is still live.
    fn is_active(&self) -> bool;

    /// Number of switchable channels. Some devices report zero.
    async fn get_channel_count(&self) -> Result<u32, Error>;

    /// Index of the dedicated USB channel, if the device has one.
    async fn usb_channel_index(&self) -> Result<Option<u32>, Error>;

    async fn supports_telemetry(&self) -> Result<bool, Error>;

    async fn get_channel_state(&self, channel: u32) -> Result<bool, Error>;

    async fn set_channel_state(&self, channel: u32, on: bool) -> Result<(), Error>;

    async fn get_telemetry(&self) -> Result<Telemetry, Error>;

    /// Lightweight reachability probe.
    async fn is_online(&self) -> Result<bool, Error>;
}
