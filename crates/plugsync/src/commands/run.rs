//! Long-running mode: start the manager with its background tasks and
//! stream entity changes until Ctrl-C or `--duration` elapses.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use plugsync_core::{ConnectionState, EntityChange, HealthSnapshot, Manager};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (config, account) = util::prepare(global)?;
    let manager = Manager::new(config, Arc::new(account));
    let mut changes = manager.entity_changes();
    let mut state = manager.connection_state();

    manager.start().await?;
    info!(devices = manager.registry().len(), "manager running");

    let duration = args.duration.map(|d| *d);
    let outcome = watch(&manager, &mut changes, &mut state, duration, global).await;

    let health = manager.health();
    manager.stop().await;
    outcome?;

    let out = output::render_single(&global.output, &health, health_detail, |h| {
        h.refresh_passes.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn watch(
    manager: &Manager,
    changes: &mut tokio::sync::broadcast::Receiver<EntityChange>,
    state: &mut tokio::sync::watch::Receiver<ConnectionState>,
    duration: Option<Duration>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let deadline = async move {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted; shutting down");
                return Ok(());
            }
            () = &mut deadline => {
                debug!("run duration elapsed");
                return Ok(());
            }
            change = changes.recv() => match change {
                Ok(change) => {
                    register_announced(manager, &change);
                    print_change(manager, &change, global)?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "entity change stream lagged");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            res = state.changed() => {
                if res.is_err() {
                    return Ok(());
                }
                let current = state.borrow_and_update().clone();
                debug!(state = ?current, "connection state changed");
                if current == ConnectionState::Failed {
                    return Err(CliError::AuthFailed {
                        message: "credentials rejected while running".into(),
                    });
                }
            }
        }
    }
}

/// Act as the entity host: claim every id a discovered device exposes, so
/// its later removal reports them.
fn register_announced(manager: &Manager, change: &EntityChange) {
    let EntityChange::DeviceDiscovered { device_id } = change else {
        return;
    };
    let Some(record) = manager.device(device_id.as_str()) else {
        return;
    };
    for entity_id in record.entity_ids() {
        manager.register_entity(device_id.as_str(), &entity_id);
    }
    debug!(device = %device_id, "entities registered");
}

fn print_change(
    manager: &Manager,
    change: &EntityChange,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let line = match global.output {
        // One JSON object per line so the stream stays parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(change, true)?,
        OutputFormat::Plain => change.device_id().to_string(),
        OutputFormat::Table => match change {
            EntityChange::DeviceDiscovered { device_id } => {
                let name = manager
                    .device(device_id.as_str())
                    .map(|d| d.display_name.clone())
                    .unwrap_or_default();
                format!("+ {device_id} {name}")
            }
            EntityChange::DeviceRemoved {
                device_id,
                entity_ids,
            } => format!("- {device_id} ({})", entity_ids.join(", ")),
        },
    };
    output::print_output(&line, global.quiet);
    Ok(())
}

fn health_detail(h: &HealthSnapshot) -> String {
    let stamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map_or_else(|| "-".into(), |t| t.format("%H:%M:%S").to_string())
    };
    [
        format!("Refresh passes:    {}", h.refresh_passes),
        format!("Discovery errors:  {}", h.discovery_failures),
        format!("Stalled cycles:    {}", h.consecutive_stalled_cycles),
        format!("Session rebuilds:  {}", h.session_rebuilds),
        format!("Last discovery:    {}", stamp(h.last_discovery)),
        format!("Last refresh:      {}", stamp(h.last_refresh)),
        format!(
            "Last pass took:    {}",
            h.last_refresh_duration
                .map_or_else(|| "-".into(), |d| format!("{}ms", d.as_millis()))
        ),
    ]
    .join("\n")
}
