// plugsync-core: device and session lifecycle manager between plugsync-api
// and hosts (CLI, home-automation bridges).

pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod listener;
pub mod manager;
pub mod model;
pub mod refresh;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::{Credentials, ManagerConfig};
pub use discovery::DiscoveryReport;
pub use error::CoreError;
pub use health::HealthSnapshot;
pub use listener::PushOutcome;
pub use manager::{ConnectionState, Manager};
pub use refresh::RefreshReport;
pub use store::DeviceRegistry;
pub use stream::{DeviceStream, DeviceWatchStream};

pub use model::{
    Capabilities, DeviceRecord, EntityChange, MetricKind, SensorEntity, SwitchEntity,
    display_name, sensor_entity_id, switch_entity_id,
};

// Collaborator types hosts need alongside the manager.
pub use plugsync_api::{AccountClient, DeviceId, DeviceSession, PushEvent};
