//! Channel switching.

use serde::Serialize;

use plugsync_core::{Command, switch_entity_id};

use crate::cli::{GlobalOpts, SwitchArgs, SwitchState};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct SwitchOutcome {
    device_id: String,
    entity_id: String,
    channel: u32,
    on: bool,
}

pub async fn handle(args: SwitchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let SwitchArgs {
        device,
        state,
        channel,
    } = args;

    let outcome = util::with_manager(global, |mgr| async move {
        let record = util::find_device(&mgr, &device)?;
        let on = match state {
            SwitchState::On => true,
            SwitchState::Off => false,
            SwitchState::Toggle => !record.is_on(channel).unwrap_or(false),
        };

        mgr.execute(Command::SetChannel {
            device_id: record.id.clone(),
            channel,
            on,
        })
        .await?;
        tracing::info!(device = %record.id, channel, on, "channel switched");

        Ok(SwitchOutcome {
            device_id: record.id.to_string(),
            entity_id: switch_entity_id(&record.id, channel, record.usb_channel_index),
            channel,
            on,
        })
    })
    .await?;

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &outcome,
        |o| format!("{}: {}", o.entity_id, output::on_off(o.on, color)),
        |o| if o.on { "on" } else { "off" }.to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
