//! Shared helpers for command handlers.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use plugsync_api::MemoryAccount;
use plugsync_config::Config;
use plugsync_core::{CoreError, DeviceRecord, Manager, ManagerConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// The config file in effect: `--config` or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(plugsync_config::config_path)
}

/// Load the config file and apply CLI flag overrides.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = plugsync_config::load_config_from(&config_file(global))?;
    if let Some(ref username) = global.username {
        cfg.username = Some(username.clone());
    }
    if let Some(ref fixture) = global.fixture {
        cfg.fixture = Some(fixture.clone());
    }
    Ok(cfg)
}

/// Build the simulated account from the configured fixture.
pub fn open_account(cfg: &Config, global: &GlobalOpts) -> Result<MemoryAccount, CliError> {
    let fixture = cfg.fixture.as_ref().ok_or_else(|| CliError::NoFixture {
        path: config_file(global).display().to_string(),
    })?;
    Ok(MemoryAccount::from_fixture_path(fixture)?)
}

/// Resolve credentials and tuning into a validated `ManagerConfig`.
pub fn manager_config(cfg: &Config, global: &GlobalOpts) -> Result<ManagerConfig, CliError> {
    let mut manager = plugsync_config::to_manager_config(cfg)?;
    if let Some(timeout) = global.timeout {
        manager.call_timeout = timeout.into();
        manager.validate()?;
    }
    Ok(manager)
}

/// Everything a command needs to construct a manager.
pub fn prepare(global: &GlobalOpts) -> Result<(ManagerConfig, MemoryAccount), CliError> {
    let cfg = load_config(global)?;
    let account = open_account(&cfg, global)?;
    let manager = manager_config(&cfg, global)?;
    Ok((manager, account))
}

/// Connect, run one discovery and refresh pass, hand the manager to `f`,
/// then disconnect.
pub async fn with_manager<F, Fut, T>(global: &GlobalOpts, f: F) -> Result<T, CliError>
where
    F: FnOnce(Manager) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let (config, account) = prepare(global)?;
    Ok(Manager::oneshot(config, Arc::new(account), f).await?)
}

/// Look a device up in the registry.
pub fn find_device(manager: &Manager, identifier: &str) -> Result<Arc<DeviceRecord>, CoreError> {
    manager
        .device(identifier)
        .ok_or_else(|| CoreError::DeviceNotFound {
            device_id: identifier.into(),
        })
}
