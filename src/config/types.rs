use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::route::{BluetoothEndpoint, RawSnapshot};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
}

/// Delays used by the route session, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Fallback poll for missed broadcasts; 0 disables polling.
    pub poll_interval_ms: u64,
    /// Wait before sending the current route to a new subscriber.
    pub subscribe_delay_ms: u64,
    /// Wait after a route command before trusting a fresh read.
    pub settle_delay_ms: u64,
    pub retry_step_ms: u64,
    pub max_confirm_attempts: u32,
    pub broadcast_delay_ms: u64,
    pub bluetooth_broadcast_delay_ms: u64,
    pub media_route_delay_ms: u64,
}

/// Initial OS state for the simulated backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub telephony_capable: bool,
    pub speaker_on: bool,
    pub wired_headset_on: bool,
    pub bluetooth_on: bool,
    pub bluetooth_devices: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            subscribe_delay_ms: 100,
            settle_delay_ms: 300,
            retry_step_ms: 100,
            max_confirm_attempts: 3,
            broadcast_delay_ms: 100,
            bluetooth_broadcast_delay_ms: 300,
            media_route_delay_ms: 200,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            telephony_capable: true,
            speaker_on: false,
            wired_headset_on: false,
            bluetooth_on: false,
            bluetooth_devices: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn to_snapshot(&self) -> RawSnapshot {
        RawSnapshot {
            speaker_on: self.speaker_on,
            wired_headset_on: self.wired_headset_on,
            bluetooth_on: self.bluetooth_on,
            telephony_capable: self.telephony_capable,
            bluetooth_devices: self
                .bluetooth_devices
                .iter()
                .map(|name| BluetoothEndpoint::new(name.as_str()))
                .collect(),
            route_settled: true,
        }
    }
}

impl Config {
    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.timing.max_confirm_attempts == 0 {
            bail!("timing.max_confirm_attempts must be at least 1");
        }
        if self.timing.settle_delay_ms == 0 {
            bail!("timing.settle_delay_ms must be greater than 0");
        }
        if self.timing.poll_interval_ms > 0 && self.timing.poll_interval_ms < 50 {
            warn!(
                "Poll interval of {}ms is very aggressive",
                self.timing.poll_interval_ms
            );
        }
        Ok(())
    }
}
