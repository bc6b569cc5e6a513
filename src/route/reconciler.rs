use std::collections::HashSet;
use tracing::debug;

use super::device::{DeviceType, OutputDevice, RawSnapshot};

/// Candidate list and active pick derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub candidates: Vec<OutputDevice>,
    pub active: OutputDevice,
}

impl Reconciliation {
    pub fn find(&self, device_type: DeviceType, title: Option<&str>) -> Option<&OutputDevice> {
        self.candidates.iter().find(|d| {
            d.device_type == device_type && title.is_none_or(|t| d.title == t)
        })
    }
}

/// Derive the candidate outputs and the single active one.
///
/// Priority is speaker > wired headset > Bluetooth > receiver. When the winning
/// type has no candidate entry the receiver is reported instead, or the speaker
/// on hardware without telephony.
pub fn reconcile(snapshot: &RawSnapshot) -> Reconciliation {
    let winner = active_type(snapshot);

    let mut candidates = vec![OutputDevice::builtin(DeviceType::Speaker, false)];

    if snapshot.telephony_capable {
        candidates.push(OutputDevice::builtin(DeviceType::Receiver, false));
    }

    let mut seen = HashSet::new();
    for endpoint in &snapshot.bluetooth_devices {
        if seen.insert(endpoint.name.as_str()) {
            candidates.push(OutputDevice::bluetooth(endpoint.name.clone(), false));
        }
    }

    if snapshot.wired_headset_on {
        candidates.push(OutputDevice::builtin(DeviceType::WiredHeadset, false));
    }

    let index = active_index(snapshot, &candidates, winner);
    candidates[index].is_active = true;
    let active = candidates[index].clone();

    debug!(
        "Reconciled {} candidates (spk={}, wired={}, bt={}, bt_devices={}): active {}",
        candidates.len(),
        snapshot.speaker_on,
        snapshot.wired_headset_on,
        snapshot.bluetooth_on,
        snapshot.bluetooth_devices.len(),
        active.title
    );

    Reconciliation { candidates, active }
}

fn active_type(snapshot: &RawSnapshot) -> DeviceType {
    if snapshot.speaker_on {
        DeviceType::Speaker
    } else if snapshot.wired_headset_on {
        DeviceType::WiredHeadset
    } else if snapshot.bluetooth_on {
        DeviceType::Bluetooth
    } else {
        DeviceType::Receiver
    }
}

fn active_index(snapshot: &RawSnapshot, candidates: &[OutputDevice], winner: DeviceType) -> usize {
    let position = |device_type: DeviceType| {
        candidates
            .iter()
            .position(|d| d.device_type == device_type)
    };

    let picked = match winner {
        DeviceType::Bluetooth => snapshot
            .bluetooth_devices
            .iter()
            .find(|d| d.active)
            .and_then(|flagged| {
                candidates.iter().position(|d| {
                    d.device_type == DeviceType::Bluetooth && d.title == flagged.name
                })
            })
            .or_else(|| position(DeviceType::Bluetooth)),
        other => position(other),
    };

    if picked.is_none() {
        debug!("No {} candidate for active route, falling back", winner);
    }

    // Speaker is always candidates[0].
    picked
        .or_else(|| position(DeviceType::Receiver))
        .unwrap_or(0)
}
