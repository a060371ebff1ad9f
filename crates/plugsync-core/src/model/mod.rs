// ── Domain model ──
//
// Device records held by the registry, the entity descriptors derived from
// them, and the change notifications sent to the host.

pub mod change;
pub mod device;
pub mod entity;

// ── Re-exports ──────────────────────────────────────────────────────

pub use change::EntityChange;
pub use device::{Capabilities, DeviceRecord, display_name};
pub use entity::{MetricKind, SensorEntity, SwitchEntity, sensor_entity_id, switch_entity_id};
