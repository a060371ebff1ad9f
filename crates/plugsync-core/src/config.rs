// ── Runtime manager configuration ──
//
// These types describe how the lifecycle manager talks to the account and
// how often it polls. They carry credential data and tuning, but never
// touch disk. The CLI builds a `ManagerConfig` and hands it in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::CoreError;

/// Account credentials passed to `AccountClient::connect`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Configuration for one lifecycle manager instance.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub credentials: Credentials,
    /// How often cached state is re-read from every available device.
    pub status_refresh_interval: Duration,
    /// How often the device list is reconciled against the account.
    pub discovery_interval: Duration,
    /// Budget for every individual remote call.
    pub call_timeout: Duration,
    /// Stalled cycles in a row before the account session is rebuilt.
    pub max_stalled_cycles: u32,
    /// Refresh passes in a row with every read failing before a device is
    /// marked unavailable.
    pub unavailable_after_failed_passes: u32,
    /// Successful discovery passes a device may be missing from before its
    /// record is removed.
    pub removal_grace_passes: u32,
    /// Subscribe to the account's push channel, if it offers one.
    pub push_events: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::new("", ""),
            status_refresh_interval: Duration::from_secs(10),
            discovery_interval: Duration::from_secs(15 * 60),
            call_timeout: Duration::from_secs(10),
            max_stalled_cycles: 10,
            unavailable_after_failed_passes: 3,
            removal_grace_passes: 1,
            push_events: true,
        }
    }
}

impl ManagerConfig {
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Reject configurations the cycles cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |message: &str| {
            Err(CoreError::Config {
                message: message.to_owned(),
            })
        };

        if self.credentials.username.is_empty() {
            return fail("username must not be empty");
        }
        if self.credentials.password.expose_secret().is_empty() {
            return fail("password must not be empty");
        }
        if self.status_refresh_interval.is_zero() || self.discovery_interval.is_zero() {
            return fail("refresh and discovery intervals must be non-zero");
        }
        if self.status_refresh_interval >= self.discovery_interval {
            return fail("status refresh interval must be shorter than the discovery interval");
        }
        if self.call_timeout.is_zero() {
            return fail("call timeout must be non-zero");
        }
        if self.max_stalled_cycles == 0
            || self.unavailable_after_failed_passes == 0
            || self.removal_grace_passes == 0
        {
            return fail("thresholds must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ManagerConfig {
        ManagerConfig::default().with_credentials(Credentials::new("user", "pass"))
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.status_refresh_interval, Duration::from_secs(10));
        assert_eq!(cfg.discovery_interval, Duration::from_secs(900));
        assert_eq!(cfg.call_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_stalled_cycles, 10);
        assert_eq!(cfg.unavailable_after_failed_passes, 3);
        assert_eq!(cfg.removal_grace_passes, 1);
        assert!(cfg.push_events);
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn refresh_must_be_shorter_than_discovery() {
        let mut cfg = valid();
        cfg.status_refresh_interval = Duration::from_secs(900);
        assert!(matches!(cfg.validate(), Err(CoreError::Config { .. })));
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut cfg = valid();
        cfg.removal_grace_passes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_credentials_rejected() {
        assert!(ManagerConfig::default().validate().is_err());
    }
}
