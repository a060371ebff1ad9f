// ── Entity change notifications ──

use plugsync_api::DeviceId;
use serde::Serialize;

/// Lifecycle notification for the host's entity layer.
///
/// Emitted on the manager's broadcast channel. A `DeviceDiscovered` always
/// follows the record's insertion, and a `DeviceRemoved` always precedes
/// its deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityChange {
    /// A new device record exists; the host should create its entities.
    DeviceDiscovered { device_id: DeviceId },
    /// The device is gone; every listed entity must be removed.
    DeviceRemoved {
        device_id: DeviceId,
        entity_ids: Vec<String>,
    },
}

impl EntityChange {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::DeviceDiscovered { device_id } | Self::DeviceRemoved { device_id, .. } => {
                device_id
            }
        }
    }
}
