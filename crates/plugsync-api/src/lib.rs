// plugsync-api: remote account boundary for the plug lifecycle manager
//
// Defines the collaborator traits the manager drives (`AccountClient`,
// `DeviceSession`), the wire-level models they exchange, and an in-memory
// backend used for fixtures and tests.

pub mod error;
pub mod memory;
pub mod models;
pub mod session;

pub use error::Error;
pub use memory::{Fault, MemoryAccount, Op, SimDevice};
pub use models::{DeviceId, DeviceSummary, PushEvent, Telemetry};
pub use session::{AccountClient, DeviceSession};
