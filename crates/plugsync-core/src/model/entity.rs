// ── Host entity descriptors ──
//
// Naming and presentation for the switch and sensor entities a host creates
// per device. The manager only tracks entity ids; these descriptors tell the
// host which ids to create and how to render sensor values.

use plugsync_api::DeviceId;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use super::device::DeviceRecord;

const SWITCH_DOMAIN: &str = "switch";
const SENSOR_DOMAIN: &str = "sensor";
const PLATFORM: &str = "meross";

/// An electricity metric reported by telemetry-capable plugs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Power,
    Current,
    Voltage,
}

impl MetricKind {
    pub const ALL: [Self; 3] = [Self::Power, Self::Current, Self::Voltage];

    pub fn unit(self) -> &'static str {
        match self {
            Self::Power => "W",
            Self::Current => "A",
            Self::Voltage => "V",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Power => "mdi:flash-outline",
            Self::Current => "mdi:current-ac",
            Self::Voltage => "mdi:power-plug",
        }
    }

    /// Multiplier from raw device units (mW, mA, dV) to display units.
    pub fn factor(self) -> f64 {
        match self {
            Self::Power | Self::Current => 0.001,
            Self::Voltage => 0.1,
        }
    }

    pub fn decimals(self) -> usize {
        2
    }

    pub fn scale(self, raw: f64) -> f64 {
        raw * self.factor()
    }

    /// Scaled value rendered with the metric's precision, e.g. `"12.35"`.
    pub fn format(self, raw: f64) -> String {
        format!("{:.*}", self.decimals(), self.scale(raw))
    }
}

/// `switch.meross_<id>`, `switch.meross_<id>_<c>` or `switch.meross_<id>_usb`.
pub fn switch_entity_id(device_id: &DeviceId, channel: u32, usb_channel: Option<u32>) -> String {
    let suffix = if usb_channel == Some(channel) {
        "_usb".to_owned()
    } else if channel == 0 {
        String::new()
    } else {
        format!("_{channel}")
    };
    format!("{SWITCH_DOMAIN}.{PLATFORM}_{device_id}{suffix}")
}

/// `sensor.meross_<id>_<metric>`.
pub fn sensor_entity_id(device_id: &DeviceId, metric: MetricKind) -> String {
    format!("{SENSOR_DOMAIN}.{PLATFORM}_{device_id}_{metric}")
}

/// One switchable channel as the host sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchEntity {
    pub entity_id: String,
    pub device_id: DeviceId,
    pub name: String,
    pub channel: u32,
    pub is_usb: bool,
}

impl SwitchEntity {
    pub(crate) fn new(record: &DeviceRecord, channel: u32) -> Self {
        Self {
            entity_id: switch_entity_id(&record.id, channel, record.usb_channel_index),
            device_id: record.id.clone(),
            name: record.display_name.clone(),
            channel,
            is_usb: record.usb_channel_index == Some(channel),
        }
    }
}

/// One telemetry metric as the host sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorEntity {
    pub entity_id: String,
    pub device_id: DeviceId,
    pub name: String,
    pub metric: MetricKind,
}

impl SensorEntity {
    pub(crate) fn new(record: &DeviceRecord, metric: MetricKind) -> Self {
        Self {
            entity_id: sensor_entity_id(&record.id, metric),
            device_id: record.id.clone(),
            name: record.display_name.clone(),
            metric,
        }
    }

    /// Formatted current value from the record's cached telemetry.
    pub fn value(&self, record: &DeviceRecord) -> Option<String> {
        record
            .telemetry
            .get(self.metric.as_ref())
            .map(|raw| self.metric.format(*raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_ids_follow_channel_suffixes() {
        let id = DeviceId::from("abc");
        assert_eq!(switch_entity_id(&id, 0, None), "switch.meross_abc");
        assert_eq!(switch_entity_id(&id, 2, None), "switch.meross_abc_2");
        assert_eq!(switch_entity_id(&id, 4, Some(4)), "switch.meross_abc_usb");
    }

    #[test]
    fn usb_suffix_wins_on_channel_zero() {
        let id = DeviceId::from("abc");
        assert_eq!(switch_entity_id(&id, 0, Some(0)), "switch.meross_abc_usb");
    }

    #[test]
    fn sensor_ids_use_metric_name() {
        let id = DeviceId::from("abc");
        assert_eq!(
            sensor_entity_id(&id, MetricKind::Voltage),
            "sensor.meross_abc_voltage"
        );
    }

    #[test]
    fn metric_formatting() {
        assert_eq!(MetricKind::Power.format(12_346.0), "12.35");
        assert_eq!(MetricKind::Current.format(56.0), "0.06");
        assert_eq!(MetricKind::Voltage.format(2301.0), "230.10");
        assert_eq!(MetricKind::Power.unit(), "W");
        assert_eq!(MetricKind::Current.icon(), "mdi:current-ac");
    }

    #[test]
    fn metric_parses_from_name() {
        assert_eq!("power".parse::<MetricKind>().ok(), Some(MetricKind::Power));
        assert_eq!(MetricKind::Voltage.to_string(), "voltage");
    }
}
