//! Entity listing: the switch and sensor ids a host would register.

use serde::Serialize;
use tabled::Tabled;

use plugsync_core::DeviceRecord;

use crate::cli::{EntitiesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Clone, Serialize, Tabled)]
struct EntityView {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Device")]
    device_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
}

fn views(record: &DeviceRecord) -> Vec<EntityView> {
    let switches = record.switch_entities().into_iter().map(|s| EntityView {
        state: record
            .is_on(s.channel)
            .map_or_else(|| "unknown".into(), |on| if on { "on" } else { "off" }.into()),
        entity_id: s.entity_id,
        kind: "switch",
        device_id: s.device_id.to_string(),
        name: s.name,
    });
    let sensors = record.sensor_entities().into_iter().map(|s| EntityView {
        state: s
            .value(record)
            .map_or_else(|| "unknown".into(), |v| format!("{v} {}", s.metric.unit())),
        entity_id: s.entity_id,
        kind: "sensor",
        device_id: s.device_id.to_string(),
        name: s.name,
    });
    switches.chain(sensors).collect()
}

pub async fn handle(args: EntitiesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let entities = util::with_manager(global, |mgr| async move {
        let records = match args.device {
            Some(ref id) => vec![util::find_device(&mgr, id)?],
            None => mgr.devices_snapshot().as_ref().clone(),
        };
        Ok(records.iter().flat_map(|r| views(r)).collect::<Vec<_>>())
    })
    .await?;

    let out = output::render_list(
        &global.output,
        &entities,
        Clone::clone,
        |e| e.entity_id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugsync_api::DeviceSummary;

    #[test]
    fn switch_and_sensor_views() {
        let mut record = DeviceRecord::from_summary(&DeviceSummary {
            id: "lamp".into(),
            name: "Lamp (mss310)".into(),
            model: None,
            online: true,
        });
        record.supports_telemetry = true;
        record.set_channel(0, true);
        record.telemetry.insert("power".into(), 12_346.0);

        let v = views(&record);
        let ids: Vec<&str> = v.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "switch.meross_lamp",
                "sensor.meross_lamp_power",
                "sensor.meross_lamp_current",
                "sensor.meross_lamp_voltage",
            ]
        );
        assert_eq!(v[0].state, "on");
        assert_eq!(v[1].state, "12.35 W");
        assert_eq!(v[2].state, "unknown");
    }
}
