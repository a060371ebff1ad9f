//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use plugsync_config::ConfigError;
use plugsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNAVAILABLE: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the cloud account: {reason}")]
    #[diagnostic(
        code(plugsync::connection_failed),
        help("Check network access, then retry. Increase verbosity with -vv for details.")
    )]
    ConnectionFailed { reason: String },

    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(plugsync::timeout),
        help("Increase the per-call budget with --timeout or manager.call_timeout.")
    )]
    Timeout { millis: u64 },

    #[error("The manager stopped before the command completed")]
    #[diagnostic(code(plugsync::stopped))]
    ManagerStopped,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(plugsync::auth_failed),
        help(
            "Verify the username and password.\n\
             Store a new password with: plugsync config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No {what} configured")]
    #[diagnostic(
        code(plugsync::no_credentials),
        help(
            "Set it in {path}, pass --username, or export PLUGSYNC_USERNAME / \
             PLUGSYNC_PASSWORD."
        )
    )]
    NoCredentials { what: String, path: String },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(plugsync::not_found),
        help("Run: plugsync devices list to see available devices")
    )]
    NotFound { identifier: String },

    #[error("Device '{identifier}' is unavailable")]
    #[diagnostic(
        code(plugsync::unavailable),
        help("The plug is offline or its session dropped. Try again once it reconnects.")
    )]
    Unavailable { identifier: String },

    #[error("Device '{identifier}' has no channel {channel}")]
    #[diagnostic(
        code(plugsync::invalid_channel),
        help("Valid channels are 0..{channel_count}")
    )]
    InvalidChannel {
        identifier: String,
        channel: u32,
        channel_count: u32,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No device fixture configured")]
    #[diagnostic(
        code(plugsync::no_fixture),
        help("Pass --fixture <file> or set `fixture` in {path}")
    )]
    NoFixture { path: String },

    #[error("Invalid fixture: {message}")]
    #[diagnostic(code(plugsync::fixture))]
    Fixture { message: String },

    #[error("Config file already exists at {path}")]
    #[diagnostic(code(plugsync::config_exists), help("Use --force to overwrite it."))]
    ConfigExists { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(plugsync::validation))]
    Validation { field: String, reason: String },

    #[error("{0}")]
    #[diagnostic(code(plugsync::config))]
    Config(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(plugsync::render))]
    Render(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(plugsync::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unavailable { .. } => exit_code::UNAVAILABLE,
            Self::InvalidChannel { .. }
            | Self::NoFixture { .. }
            | Self::ConfigExists { .. }
            | Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::Timeout { timeout_ms } => CliError::Timeout { millis: timeout_ms },
            CoreError::DeviceNotFound { device_id } => CliError::NotFound {
                identifier: device_id,
            },
            CoreError::DeviceUnavailable { device_id } => CliError::Unavailable {
                identifier: device_id,
            },
            CoreError::InvalidChannel {
                device_id,
                channel,
                channel_count,
            } => CliError::InvalidChannel {
                identifier: device_id,
                channel,
                channel_count,
            },
            CoreError::ManagerStopped => CliError::ManagerStopped,
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { what, path } => CliError::NoCredentials {
                what: what.into(),
                path,
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other.to_string()),
        }
    }
}

impl From<plugsync_api::Error> for CliError {
    fn from(err: plugsync_api::Error) -> Self {
        match err {
            plugsync_api::Error::Fixture { message } => CliError::Fixture { message },
            other => CoreError::from(other).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::AuthenticationFailed {
                    message: "nope".into(),
                },
                exit_code::AUTH,
            ),
            (CoreError::Timeout { timeout_ms: 10 }, exit_code::TIMEOUT),
            (
                CoreError::DeviceNotFound {
                    device_id: "x".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::DeviceUnavailable {
                    device_id: "x".into(),
                },
                exit_code::UNAVAILABLE,
            ),
            (
                CoreError::InvalidChannel {
                    device_id: "x".into(),
                    channel: 4,
                    channel_count: 1,
                },
                exit_code::USAGE,
            ),
            (CoreError::ManagerStopped, exit_code::GENERAL),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn fixture_errors_keep_their_message() {
        let err = CliError::from(plugsync_api::Error::Fixture {
            message: "bad toml".into(),
        });
        assert!(matches!(err, CliError::Fixture { ref message } if message == "bad toml"));
    }
}
