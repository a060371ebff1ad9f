use thiserror::Error;

/// Top-level error type for the `plugsync-api` crate.
///
/// Covers every failure a remote call can produce: credential rejection,
/// connectivity loss, timeouts, and invalidated device sessions.
/// `plugsync-core` maps these into lifecycle-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Credentials rejected by the cloud account.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A call was issued before `connect()` succeeded (or after `disconnect()`).
    #[error("Not connected to the cloud account")]
    NotConnected,

    // ── Transport ───────────────────────────────────────────────────
    /// Cloud or device unreachable (DNS failure, broker drop, device offline).
    #[error("Connectivity error: {message}")]
    Connectivity { message: String },

    /// Request did not complete in time.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The device session was invalidated by a newer account session.
    #[error("Session for device {device_id} is no longer active")]
    SessionClosed { device_id: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The account does not know the requested device.
    #[error("Unknown device: {device_id}")]
    UnknownDevice { device_id: String },

    /// A device fixture could not be read or parsed.
    #[error("Invalid fixture: {message}")]
    Fixture { message: String },
}

impl Error {
    /// Build a [`Timeout`](Self::Timeout) from the elapsed budget.
    pub fn timeout(budget: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns `true` if the credentials were rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next scheduled pass.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. }
                | Self::Timeout { .. }
                | Self::SessionClosed { .. }
                | Self::NotConnected
        )
    }

    /// Returns `true` if the call ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
