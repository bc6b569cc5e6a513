use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::TimingConfig;

/// Reason attached to an OS route-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteChangeReason {
    Unknown,
    NewDeviceAvailable,
    OldDeviceUnavailable,
    CategoryChange,
    Override,
    WakeFromSleep,
    NoSuitableRouteForCategory,
    RouteConfigurationChange,
}

impl RouteChangeReason {
    /// Only user-visible route changes are worth a re-check.
    pub fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            RouteChangeReason::Override
                | RouteChangeReason::NewDeviceAvailable
                | RouteChangeReason::OldDeviceUnavailable
                | RouteChangeReason::CategoryChange
        )
    }
}

/// Producer of an "external change detected" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    SpeakerphoneChanged,
    ScoStateChanged,
    HeadsetPlug,
    BluetoothConnection,
    /// The media router selected a different route.
    MediaRouteSelected,
    RouteChange(RouteChangeReason),
    Poll,
}

impl ChangeSource {
    pub fn is_relevant(&self) -> bool {
        match self {
            ChangeSource::RouteChange(reason) => reason.is_user_initiated(),
            _ => true,
        }
    }

    pub fn reason(&self) -> Option<RouteChangeReason> {
        match self {
            ChangeSource::RouteChange(reason) => Some(*reason),
            _ => None,
        }
    }

    /// How long to wait before reading the route after this signal.
    pub fn check_delay(&self, timing: &TimingConfig) -> Duration {
        match self {
            ChangeSource::Poll => Duration::ZERO,
            // Bluetooth disconnects take longer to propagate.
            ChangeSource::BluetoothConnection => {
                Duration::from_millis(timing.bluetooth_broadcast_delay_ms)
            }
            ChangeSource::MediaRouteSelected => Duration::from_millis(timing.media_route_delay_ms),
            _ => Duration::from_millis(timing.broadcast_delay_ms),
        }
    }
}
