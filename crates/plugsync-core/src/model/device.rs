// ── Device domain types ──

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use plugsync_api::{DeviceId, DeviceSession, DeviceSummary, Telemetry};
use serde::Serialize;

use super::entity::{MetricKind, SensorEntity, SwitchEntity};

/// Capability information probed once per device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub channel_count: u32,
    pub usb_channel_index: Option<u32>,
    pub supports_telemetry: bool,
}

impl Capabilities {
    /// Build from raw probe results. Devices that report zero channels
    /// still get one.
    pub fn from_probe(channel_count: u32, usb_channel_index: Option<u32>, supports_telemetry: bool) -> Self {
        Self {
            channel_count: channel_count.max(1),
            usb_channel_index,
            supports_telemetry,
        }
    }
}

/// Everything the manager knows about one remote device.
///
/// Records are immutable once stored in the registry; mutation goes through
/// `DeviceRegistry::update`, which clones, edits and swaps the whole record.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    /// Derived from the account label at discovery time, never changed.
    pub display_name: String,
    pub model: Option<String>,
    /// Always at least 1.
    pub channel_count: u32,
    pub usb_channel_index: Option<u32>,
    pub supports_telemetry: bool,
    /// Whether a capability probe has succeeded for this record.
    pub probed: bool,
    pub channel_state: BTreeMap<u32, bool>,
    pub telemetry: Telemetry,
    pub available: bool,
    pub consecutive_failed_passes: u32,
    pub missed_discoveries: u32,
    pub registered_entity_ids: Vec<String>,
    #[serde(skip)]
    pub proxy: Option<Arc<dyn DeviceSession>>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Fresh record for a newly listed device, before any probe.
    pub fn from_summary(summary: &DeviceSummary) -> Self {
        Self {
            id: summary.id.clone(),
            display_name: display_name(&summary.name, &summary.id),
            model: summary.model.clone(),
            channel_count: 1,
            usb_channel_index: None,
            supports_telemetry: false,
            probed: false,
            channel_state: BTreeMap::new(),
            telemetry: Telemetry::new(),
            available: summary.online,
            consecutive_failed_passes: 0,
            missed_discoveries: 0,
            registered_entity_ids: Vec::new(),
            proxy: None,
            last_refreshed: None,
        }
    }

    pub fn apply_capabilities(&mut self, caps: Capabilities) {
        self.channel_count = caps.channel_count;
        self.usb_channel_index = caps.usb_channel_index;
        self.supports_telemetry = caps.supports_telemetry;
        self.probed = true;
        self.channel_state.retain(|c, _| *c < caps.channel_count);
    }

    /// Proxy present and its account session still live.
    pub fn has_live_session(&self) -> bool {
        self.proxy.as_ref().is_some_and(|p| p.is_active())
    }

    /// Cache a channel state. Out-of-range channels are ignored; returns
    /// whether the write was applied.
    pub fn set_channel(&mut self, channel: u32, on: bool) -> bool {
        if channel >= self.channel_count {
            return false;
        }
        self.channel_state.insert(channel, on);
        true
    }

    pub fn is_on(&self, channel: u32) -> Option<bool> {
        self.channel_state.get(&channel).copied()
    }

    pub fn mark_unavailable(&mut self) {
        self.available = false;
    }

    // ── Entity descriptors ───────────────────────────────────────────

    /// One switch per channel, in channel order.
    pub fn switch_entities(&self) -> Vec<SwitchEntity> {
        (0..self.channel_count)
            .map(|channel| SwitchEntity::new(self, channel))
            .collect()
    }

    /// One sensor per metric, or none for devices without telemetry.
    pub fn sensor_entities(&self) -> Vec<SensorEntity> {
        if !self.supports_telemetry {
            return Vec::new();
        }
        MetricKind::ALL
            .iter()
            .map(|metric| SensorEntity::new(self, *metric))
            .collect()
    }

    /// Ids of every entity the host should create for this record.
    pub fn entity_ids(&self) -> Vec<String> {
        self.switch_entities()
            .into_iter()
            .map(|s| s.entity_id)
            .chain(self.sensor_entities().into_iter().map(|s| s.entity_id))
            .collect()
    }
}

/// Display name from an account label: everything before the first `'('`,
/// trailing whitespace trimmed. Falls back to the id when nothing is left.
pub fn display_name(label: &str, id: &DeviceId) -> String {
    let name = label.split('(').next().unwrap_or_default().trim_end();
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str) -> DeviceSummary {
        DeviceSummary {
            id: DeviceId::from("1811"),
            name: name.into(),
            model: Some("mss310".into()),
            online: true,
        }
    }

    #[test]
    fn display_name_strips_model_suffix() {
        let id = DeviceId::from("x");
        assert_eq!(display_name("Desk lamp (mss310)", &id), "Desk lamp");
        assert_eq!(display_name("Heater", &id), "Heater");
        assert_eq!(display_name("Fan  ", &id), "Fan");
        assert_eq!(display_name("(mss310)", &id), "x");
        assert_eq!(display_name("", &id), "x");
    }

    #[test]
    fn zero_channels_clamped_to_one() {
        let caps = Capabilities::from_probe(0, None, false);
        assert_eq!(caps.channel_count, 1);
    }

    #[test]
    fn new_record_defaults() {
        let rec = DeviceRecord::from_summary(&summary("Desk lamp (mss310)"));
        assert_eq!(rec.display_name, "Desk lamp");
        assert_eq!(rec.channel_count, 1);
        assert!(!rec.probed);
        assert!(rec.available);
        assert!(rec.proxy.is_none());
        assert!(!rec.has_live_session());
    }

    #[test]
    fn set_channel_rejects_out_of_range() {
        let mut rec = DeviceRecord::from_summary(&summary("Plug"));
        assert!(rec.set_channel(0, true));
        assert!(!rec.set_channel(1, true));
        assert_eq!(rec.is_on(0), Some(true));
        assert_eq!(rec.is_on(1), None);
    }

    #[test]
    fn shrinking_capabilities_prunes_channel_state() {
        let mut rec = DeviceRecord::from_summary(&summary("Strip"));
        rec.apply_capabilities(Capabilities::from_probe(4, Some(3), false));
        rec.set_channel(3, true);
        rec.apply_capabilities(Capabilities::from_probe(2, None, false));
        assert!(rec.channel_state.is_empty());
        assert!(rec.probed);
    }

    #[test]
    fn entity_ids_cover_switches_and_sensors() {
        let mut rec = DeviceRecord::from_summary(&summary("Strip"));
        rec.apply_capabilities(Capabilities::from_probe(3, Some(2), true));
        assert_eq!(
            rec.entity_ids(),
            vec![
                "switch.meross_1811",
                "switch.meross_1811_1",
                "switch.meross_1811_usb",
                "sensor.meross_1811_power",
                "sensor.meross_1811_current",
                "sensor.meross_1811_voltage",
            ]
        );
    }
}
