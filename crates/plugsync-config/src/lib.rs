//! Shared configuration for plugsync.
//!
//! TOML file + `PLUGSYNC_` environment overrides, password resolution
//! (env + keyring + plaintext), and translation to
//! `plugsync_core::ManagerConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use plugsync_core::{CoreError, Credentials, ManagerConfig};

/// Keyring service name. Entries are keyed by account username.
pub const KEYRING_SERVICE: &str = "plugsync";

/// Env var consulted first when resolving the account password.
pub const PASSWORD_ENV: &str = "PLUGSYNC_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {what} configured (set it in {path} or via PLUGSYNC_ env vars)")]
    NoCredentials { what: &'static str, path: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<CoreError> for ConfigError {
    fn from(err: CoreError) -> Self {
        Self::Validation {
            field: "manager".into(),
            reason: err.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Cloud account username (e-mail).
    pub username: Option<String>,

    /// Account password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Device fixture backing the in-memory account.
    pub fixture: Option<PathBuf>,

    /// Cycle timing and thresholds.
    #[serde(default)]
    pub manager: ManagerSection,
}

/// `[manager]` table. Durations are humantime strings ("10s", "15m").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerSection {
    pub refresh_interval: String,
    pub discovery_interval: String,
    pub call_timeout: String,
    pub max_stalled_cycles: u32,
    pub unavailable_after_failed_passes: u32,
    pub removal_grace_passes: u32,
    pub push_events: bool,
}

impl Default for ManagerSection {
    fn default() -> Self {
        let defaults = ManagerConfig::default();
        Self {
            refresh_interval: format_duration(defaults.status_refresh_interval),
            discovery_interval: format_duration(defaults.discovery_interval),
            call_timeout: format_duration(defaults.call_timeout),
            max_stalled_cycles: defaults.max_stalled_cycles,
            unavailable_after_failed_passes: defaults.unavailable_after_failed_passes,
            removal_grace_passes: defaults.removal_grace_passes,
            push_events: defaults.push_events,
        }
    }
}

fn format_duration(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

fn parse_duration(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("'{raw}': {e}"),
    })
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "plugsync", "plugsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("plugsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` + environment. A missing file yields the
/// defaults.
///
/// Nested keys use a double underscore: `PLUGSYNC_MANAGER__CALL_TIMEOUT=5s`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PLUGSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the account password: env var, then keyring, then plaintext.
pub fn resolve_password(cfg: &Config) -> Result<SecretString, ConfigError> {
    resolve_password_chain(cfg, std::env::var(PASSWORD_ENV).ok(), keyring_password)
}

fn keyring_password(username: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, username)
        .ok()?
        .get_password()
        .ok()
}

fn resolve_password_chain(
    cfg: &Config,
    from_env: Option<String>,
    from_keyring: impl FnOnce(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Env var
    if let Some(pw) = from_env.filter(|pw| !pw.is_empty()) {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Some(username) = cfg.username.as_deref() {
        if let Some(pw) = from_keyring(username) {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = cfg.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(no_credentials("password"))
}

/// Store `password` in the system keyring for `username`.
pub fn store_password(username: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, username)
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

fn no_credentials(what: &'static str) -> ConfigError {
    ConfigError::NoCredentials {
        what,
        path: config_path().display().to_string(),
    }
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a validated `ManagerConfig`, resolving the password through the
/// full credential chain.
pub fn to_manager_config(cfg: &Config) -> Result<ManagerConfig, ConfigError> {
    let password = resolve_password(cfg)?;
    build_manager_config(cfg, password)
}

/// Build a validated `ManagerConfig` with an already-resolved password.
pub fn build_manager_config(
    cfg: &Config,
    password: SecretString,
) -> Result<ManagerConfig, ConfigError> {
    let username = cfg
        .username
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| no_credentials("username"))?;
    let section = &cfg.manager;

    let manager = ManagerConfig {
        credentials: Credentials { username, password },
        status_refresh_interval: parse_duration(
            "manager.refresh_interval",
            &section.refresh_interval,
        )?,
        discovery_interval: parse_duration(
            "manager.discovery_interval",
            &section.discovery_interval,
        )?,
        call_timeout: parse_duration("manager.call_timeout", &section.call_timeout)?,
        max_stalled_cycles: section.max_stalled_cycles,
        unavailable_after_failed_passes: section.unavailable_after_failed_passes,
        removal_grace_passes: section.removal_grace_passes,
        push_events: section.push_events,
    };
    manager.validate()?;
    Ok(manager)
}
