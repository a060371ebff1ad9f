// ── Wire-level models ──
//
// Shapes exchanged with the remote account: device identifiers, the
// discovery summary, telemetry readings, and push notifications.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── DeviceId ────────────────────────────────────────────────────────

/// Opaque, stable vendor identifier for one physical device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ── Telemetry ───────────────────────────────────────────────────────

/// Raw electricity readings keyed by metric name (`power`, `current`,
/// `voltage`). Values are in device units (mW, mA, dV).
pub type Telemetry = BTreeMap<String, f64>;

// ── DeviceSummary ───────────────────────────────────────────────────

/// One entry of the account's device list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: DeviceId,
    /// Human label as reported by the account, e.g. `"Desk lamp (mss310)"`.
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    pub online: bool,
}

// ── PushEvent ───────────────────────────────────────────────────────

/// An asynchronous notification from the account's push channel.
///
/// Ordering is not guaranteed across devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushEvent {
    /// The push transport itself connected or dropped.
    ConnectionStateChanged { connected: bool },
    /// A device came online or went offline.
    DeviceOnlineStatusChanged { device_id: DeviceId, online: bool },
    /// A channel was toggled, physically or remotely.
    ChannelStateChanged {
        device_id: DeviceId,
        channel: u32,
        on: bool,
    },
}

impl PushEvent {
    /// The device this event concerns, if any.
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::ConnectionStateChanged { .. } => None,
            Self::DeviceOnlineStatusChanged { device_id, .. }
            | Self::ChannelStateChanged { device_id, .. } => Some(device_id),
        }
    }
}
