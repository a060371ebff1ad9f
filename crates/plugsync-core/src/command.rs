// ── Command API ──
//
// Write operations and on-demand cycles flow through a unified `Command`
// enum. The manager's processor task routes each one and answers through
// a oneshot channel.

use plugsync_api::DeviceId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::discovery::DiscoveryReport;
use crate::error::CoreError;
use crate::manager::Manager;
use crate::refresh::RefreshReport;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// Everything a host can ask the manager to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Switch one channel on or off.
    SetChannel {
        device_id: DeviceId,
        channel: u32,
        on: bool,
    },
    /// Run a discovery pass now.
    PullDevices,
    /// Run a refresh pass now.
    ForceUpdate,
}

/// Result of a successfully executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    Discovery(DiscoveryReport),
    Refresh(RefreshReport),
}

impl Manager {
    /// Switch a channel and, only once the device confirms, cache the new
    /// state.
    pub async fn set_channel(&self, device_id: &str, channel: u32, on: bool) -> Result<(), CoreError> {
        let registry = &self.inner.registry;
        let not_found = || CoreError::DeviceNotFound {
            device_id: device_id.to_owned(),
        };

        let record = registry.get(device_id).ok_or_else(not_found)?;
        let proxy = record.proxy.clone().ok_or_else(not_found)?;

        if !record.available || !proxy.is_active() {
            registry.update(device_id, |r| r.mark_unavailable());
            if !proxy.is_active() {
                self.trigger_discovery();
            }
            return Err(CoreError::DeviceUnavailable {
                device_id: device_id.to_owned(),
            });
        }

        if channel >= record.channel_count {
            return Err(CoreError::InvalidChannel {
                device_id: device_id.to_owned(),
                channel,
                channel_count: record.channel_count,
            });
        }

        if let Err(e) = self.remote_call(proxy.set_channel_state(channel, on)).await {
            warn!(device = %device_id, channel, on, error = %e, "switch command failed");
            return Err(e);
        }

        registry.update(device_id, |r| r.set_channel(channel, on));
        debug!(device = %device_id, channel, on, "switch command applied");
        Ok(())
    }
}

/// Process commands from the mpsc channel one at a time.
pub(crate) async fn command_processor_task(
    manager: Manager,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&manager, envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

async fn route_command(manager: &Manager, cmd: Command) -> Result<CommandResult, CoreError> {
    match cmd {
        Command::SetChannel {
            device_id,
            channel,
            on,
        } => {
            manager.set_channel(device_id.as_str(), channel, on).await?;
            Ok(CommandResult::Ok)
        }
        Command::PullDevices => manager.discover().await.map(CommandResult::Discovery),
        Command::ForceUpdate => Ok(CommandResult::Refresh(manager.refresh().await)),
    }
}
