use serde::{Deserialize, Serialize};
use std::fmt;

use super::source::RouteChangeReason;

/// Physical output endpoint class, serialized with the host's camelCase names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    Speaker,
    Receiver,
    WiredHeadset,
    Bluetooth,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Speaker => "speaker",
            DeviceType::Receiver => "receiver",
            DeviceType::WiredHeadset => "wiredHeadset",
            DeviceType::Bluetooth => "bluetooth",
        }
    }

    /// Built-in types have exactly one instance and use their type name as title.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, DeviceType::Bluetooth)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate audio sink as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDevice {
    pub title: String,
    pub is_active: bool,
    pub device_type: DeviceType,
}

impl OutputDevice {
    pub fn builtin(device_type: DeviceType, is_active: bool) -> Self {
        Self {
            title: device_type.as_str().to_string(),
            is_active,
            device_type,
        }
    }

    pub fn bluetooth(name: impl Into<String>, is_active: bool) -> Self {
        Self {
            title: name.into(),
            is_active,
            device_type: DeviceType::Bluetooth,
        }
    }

    pub fn key(&self) -> RouteKey {
        RouteKey::of(self)
    }
}

impl fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}){}",
            self.title,
            self.device_type,
            if self.is_active { " [active]" } else { "" }
        )
    }
}

/// Identity of a route: the type for built-ins, the product name for Bluetooth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteKey {
    Builtin(DeviceType),
    Bluetooth(String),
}

impl RouteKey {
    pub fn of(device: &OutputDevice) -> Self {
        match device.device_type {
            DeviceType::Bluetooth => RouteKey::Bluetooth(device.title.clone()),
            other => RouteKey::Builtin(other),
        }
    }
}

/// A Bluetooth-capable endpoint as enumerated by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothEndpoint {
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

impl BluetoothEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: false,
        }
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Raw OS routing state at one instant. Read fresh for every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSnapshot {
    pub speaker_on: bool,
    pub wired_headset_on: bool,
    pub bluetooth_on: bool,
    pub telephony_capable: bool,
    #[serde(default)]
    pub bluetooth_devices: Vec<BluetoothEndpoint>,
    /// False while the OS reports no output port for the current route.
    #[serde(default = "default_route_settled")]
    pub route_settled: bool,
}

fn default_route_settled() -> bool {
    true
}

impl Default for RawSnapshot {
    fn default() -> Self {
        Self {
            speaker_on: false,
            wired_headset_on: false,
            bluetooth_on: false,
            telephony_capable: true,
            bluetooth_devices: Vec::new(),
            route_settled: true,
        }
    }
}

impl RawSnapshot {
    pub fn has_bluetooth_device(&self, name: &str) -> bool {
        self.bluetooth_devices.iter().any(|d| d.name == name)
    }
}

/// Notification delivered on the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RouteEvent {
    #[serde(rename_all = "camelCase")]
    AudioRouteChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        active_device: Option<OutputDevice>,
        /// OS reason, present only when an OS route-change notification
        /// triggered the check.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<RouteChangeReason>,
    },
}

impl RouteEvent {
    pub fn changed(device: &OutputDevice) -> Self {
        RouteEvent::AudioRouteChanged {
            active_device: Some(OutputDevice {
                is_active: true,
                ..device.clone()
            }),
            reason: None,
        }
    }

    pub fn undetermined() -> Self {
        RouteEvent::AudioRouteChanged {
            active_device: None,
            reason: None,
        }
    }

    pub fn with_reason(self, reason: Option<RouteChangeReason>) -> Self {
        match self {
            RouteEvent::AudioRouteChanged { active_device, .. } => {
                RouteEvent::AudioRouteChanged {
                    active_device,
                    reason,
                }
            }
        }
    }

    pub fn active_device(&self) -> Option<&OutputDevice> {
        match self {
            RouteEvent::AudioRouteChanged { active_device, .. } => active_device.as_ref(),
        }
    }

    pub fn reason(&self) -> Option<RouteChangeReason> {
        match self {
            RouteEvent::AudioRouteChanged { reason, .. } => *reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_serializes_with_host_field_names() {
        let device = OutputDevice::builtin(DeviceType::WiredHeadset, true);
        let json = serde_json::to_value(&device).unwrap();

        assert_eq!(json["title"], "wiredHeadset");
        assert_eq!(json["deviceType"], "wiredHeadset");
        assert_eq!(json["isActive"], true);
    }

    #[test]
    fn test_event_payload_shape() {
        let event = RouteEvent::changed(&OutputDevice::bluetooth("AirPods Pro", false));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "audioRouteChanged");
        assert_eq!(json["activeDevice"]["title"], "AirPods Pro");
        assert_eq!(json["activeDevice"]["isActive"], true);
    }

    #[test]
    fn test_undetermined_event_omits_active_device() {
        let json = serde_json::to_value(RouteEvent::undetermined()).unwrap();

        assert_eq!(json["event"], "audioRouteChanged");
        assert!(json.get("activeDevice").is_none());
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_reason_serialized_when_present() {
        let event = RouteEvent::changed(&OutputDevice::builtin(DeviceType::Speaker, true))
            .with_reason(Some(RouteChangeReason::OldDeviceUnavailable));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["reason"], "oldDeviceUnavailable");
        assert_eq!(json["activeDevice"]["title"], "speaker");
    }

    #[test]
    fn test_route_key_identity() {
        let a = OutputDevice::bluetooth("Buds", true);
        let b = OutputDevice::bluetooth("Buds", false);
        let speaker = OutputDevice::builtin(DeviceType::Speaker, true);

        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), speaker.key());
        assert_eq!(speaker.key(), RouteKey::Builtin(DeviceType::Speaker));
    }
}
