// ── Device storage ──
//
// Replace-on-write record storage with push-based change notification.

mod registry;

pub use registry::DeviceRegistry;
