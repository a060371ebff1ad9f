//! Device command handlers.

use std::sync::Arc;

use tabled::Tabled;

use plugsync_core::{DeviceRecord, MetricKind};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Channels")]
    channels: String,
    #[tabled(rename = "Power")]
    power: String,
}

impl DeviceRow {
    fn new(d: &DeviceRecord, color: bool) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.display_name.clone(),
            model: d.model.clone().unwrap_or_default(),
            status: output::availability(d.available, color),
            channels: channel_summary(d, color),
            power: metric(d, MetricKind::Power).unwrap_or_else(|| "-".into()),
        }
    }
}

/// "on off usb:off", or "?" for channels never read.
fn channel_summary(d: &DeviceRecord, color: bool) -> String {
    (0..d.channel_count)
        .map(|c| {
            let state = d
                .is_on(c)
                .map_or_else(|| "?".into(), |on| output::on_off(on, color));
            if d.usb_channel_index == Some(c) {
                format!("usb:{state}")
            } else {
                state
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn metric(d: &DeviceRecord, kind: MetricKind) -> Option<String> {
    d.telemetry
        .get(kind.as_ref())
        .map(|raw| format!("{} {}", kind.format(*raw), kind.unit()))
}

fn detail(d: &DeviceRecord, color: bool) -> String {
    let mut lines = vec![
        format!("ID:        {}", d.id),
        format!("Name:      {}", d.display_name),
        format!("Model:     {}", d.model.as_deref().unwrap_or("-")),
        format!("Status:    {}", output::availability(d.available, color)),
        format!(
            "Session:   {}",
            if d.has_live_session() { "live" } else { "none" }
        ),
        format!("Probed:    {}", if d.probed { "yes" } else { "no" }),
    ];
    for c in 0..d.channel_count {
        let state = d
            .is_on(c)
            .map_or_else(|| "unknown".into(), |on| output::on_off(on, color));
        let label = if d.usb_channel_index == Some(c) {
            format!("{c} (usb)")
        } else {
            c.to_string()
        };
        lines.push(format!("Channel {label}: {state}"));
    }
    if d.supports_telemetry {
        for kind in MetricKind::ALL {
            let value = metric(d, kind).unwrap_or_else(|| "-".into());
            lines.push(format!("{:<10} {value}", format!("{kind}:")));
        }
    }
    if let Some(at) = d.last_refreshed {
        lines.push(format!("Refreshed: {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    let out = match args.command {
        DevicesCommand::List => {
            let devices: Vec<Arc<DeviceRecord>> =
                util::with_manager(global, |mgr| async move {
                    Ok(mgr.devices_snapshot().as_ref().clone())
                })
                .await?;
            output::render_list(
                &global.output,
                &devices,
                |d| DeviceRow::new(d, color),
                |d| d.id.to_string(),
            )?
        }
        DevicesCommand::Get { device } => {
            let record = util::with_manager(global, |mgr| async move {
                util::find_device(&mgr, &device)
            })
            .await?;
            output::render_single(
                &global.output,
                &record,
                |d| detail(d, color),
                |d| d.id.to_string(),
            )?
        }
    };

    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugsync_api::DeviceSummary;

    fn strip() -> DeviceRecord {
        let mut record = DeviceRecord::from_summary(&DeviceSummary {
            id: "s1".into(),
            name: "Strip (mss425e)".into(),
            model: Some("mss425e".into()),
            online: true,
        });
        record.channel_count = 3;
        record.usb_channel_index = Some(2);
        record.set_channel(0, true);
        record.set_channel(2, false);
        record
    }

    #[test]
    fn channel_summary_marks_usb_and_unknown() {
        assert_eq!(channel_summary(&strip(), false), "on ? usb:off");
    }

    #[test]
    fn detail_lists_every_channel() {
        let text = detail(&strip(), false);
        assert!(text.contains("Name:      Strip"));
        assert!(text.contains("Channel 1: unknown"));
        assert!(text.contains("Channel 2 (usb): off"));
    }
}
