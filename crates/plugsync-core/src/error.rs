// ── Core error types ──
//
// Lifecycle-level errors from plugsync-core. Consumers never see raw
// transport failures; the `From<plugsync_api::Error>` impl folds them into
// the variants the manager's propagation policy is written against.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Connection to the cloud account failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Remote call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Device unavailable: {device_id}")]
    DeviceUnavailable { device_id: String },

    #[error("Device {device_id} has no channel {channel} (channel count {channel_count})")]
    InvalidChannel {
        device_id: String,
        channel: u32,
        channel_count: u32,
    },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Manager is not running")]
    ManagerStopped,

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for failures the next scheduled cycle may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::DeviceUnavailable { .. }
        )
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<plugsync_api::Error> for CoreError {
    fn from(err: plugsync_api::Error) -> Self {
        match err {
            plugsync_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            plugsync_api::Error::NotConnected => CoreError::ConnectionFailed {
                reason: "account session is not connected".into(),
            },
            plugsync_api::Error::Connectivity { message } => {
                CoreError::ConnectionFailed { reason: message }
            }
            plugsync_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            plugsync_api::Error::SessionClosed { device_id } => {
                CoreError::DeviceUnavailable { device_id }
            }
            plugsync_api::Error::UnknownDevice { device_id } => {
                CoreError::DeviceNotFound { device_id }
            }
            plugsync_api::Error::Fixture { message } => CoreError::Config { message },
        }
    }
}
