//! Builders for raw routing snapshots and session timing used across the
//! integration tests. Not every test uses every method.

#![allow(dead_code)]

use output_route_selector::config::TimingConfig;
use output_route_selector::route::{BluetoothEndpoint, RawSnapshot};

/// Builder for OS routing state as the backend would report it
pub struct SnapshotBuilder {
    snapshot: RawSnapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            snapshot: RawSnapshot::default(),
        }
    }

    pub fn speaker(mut self) -> Self {
        self.snapshot.speaker_on = true;
        self
    }

    pub fn wired(mut self) -> Self {
        self.snapshot.wired_headset_on = true;
        self
    }

    /// Bluetooth audio is routed (SCO / A2DP active)
    pub fn bluetooth_route(mut self) -> Self {
        self.snapshot.bluetooth_on = true;
        self
    }

    pub fn bluetooth_device(mut self, name: &str) -> Self {
        self.snapshot
            .bluetooth_devices
            .push(BluetoothEndpoint::new(name));
        self
    }

    pub fn active_bluetooth_device(mut self, name: &str) -> Self {
        self.snapshot
            .bluetooth_devices
            .push(BluetoothEndpoint::new(name).active(true));
        self
    }

    pub fn no_telephony(mut self) -> Self {
        self.snapshot.telephony_capable = false;
        self
    }

    /// The OS reports no output port for the current route
    pub fn unsettled(mut self) -> Self {
        self.snapshot.route_settled = false;
        self
    }

    pub fn build(self) -> RawSnapshot {
        self.snapshot
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default timings with the fallback poll switched off
pub fn timing_without_poll() -> TimingConfig {
    TimingConfig {
        poll_interval_ms: 0,
        ..TimingConfig::default()
    }
}
