use anyhow::Result;
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::TimingConfig;
use crate::error::RouteError;
use crate::system::AudioRouteInterface;

use super::device::{DeviceType, OutputDevice, RawSnapshot};
use super::reconciler::reconcile;

/// Output the host asked to switch to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchTarget {
    Speaker,
    Receiver,
    WiredHeadset,
    Bluetooth(String),
}

impl SwitchTarget {
    /// Map a host-supplied title to a target. Built-in titles are matched
    /// case-insensitively; anything else names a Bluetooth product.
    pub fn from_title(title: &str) -> Result<Self, RouteError> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(RouteError::InvalidArguments(
                "deviceTitle is required".to_string(),
            ));
        }

        Ok(match trimmed.to_lowercase().as_str() {
            "speaker" => SwitchTarget::Speaker,
            "receiver" => SwitchTarget::Receiver,
            "wiredheadset" => SwitchTarget::WiredHeadset,
            _ => SwitchTarget::Bluetooth(trimmed.to_string()),
        })
    }

    pub fn device_type(&self) -> DeviceType {
        match self {
            SwitchTarget::Speaker => DeviceType::Speaker,
            SwitchTarget::Receiver => DeviceType::Receiver,
            SwitchTarget::WiredHeadset => DeviceType::WiredHeadset,
            SwitchTarget::Bluetooth(_) => DeviceType::Bluetooth,
        }
    }

    /// Check the target against a fresh snapshot before any OS call.
    fn ensure_available(&self, snapshot: &RawSnapshot) -> Result<(), RouteError> {
        match self {
            SwitchTarget::WiredHeadset if !snapshot.wired_headset_on => Err(
                RouteError::DeviceNotFound("Wired headset not available".to_string()),
            ),
            SwitchTarget::Bluetooth(name) if !snapshot.has_bluetooth_device(name) => {
                let available: Vec<&str> = snapshot
                    .bluetooth_devices
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect();
                warn!(
                    "Bluetooth device '{}' not found. Available: [{}]",
                    name,
                    available.join(", ")
                );
                Err(RouteError::DeviceNotFound(format!(
                    "Bluetooth device '{name}' not found"
                )))
            }
            _ => Ok(()),
        }
    }

    fn needs_enumeration(&self) -> bool {
        matches!(self, SwitchTarget::WiredHeadset | SwitchTarget::Bluetooth(_))
    }
}

impl fmt::Display for SwitchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchTarget::Bluetooth(name) => write!(f, "bluetooth '{name}'"),
            other => f.write_str(other.device_type().as_str()),
        }
    }
}

/// Result of a switch request once the route has been re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The route the OS actually settled on, which may differ from the target.
    Confirmed(OutputDevice),
    /// Retries ran out before the route settled.
    Undetermined,
    /// A newer request took over before this one was confirmed.
    Superseded,
}

pub type SwitchResponder = oneshot::Sender<Result<SwitchOutcome, RouteError>>;

/// Settle delay followed by increasing retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmSchedule {
    pub settle_delay: Duration,
    pub retry_step: Duration,
    pub max_attempts: u32,
}

impl ConfirmSchedule {
    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(timing.settle_delay_ms),
            retry_step: Duration::from_millis(timing.retry_step_ms),
            max_attempts: timing.max_confirm_attempts.max(1),
        }
    }

    /// Delay before `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            self.settle_delay
        } else {
            self.retry_step * (attempt - 1)
        }
    }
}

impl Default for ConfirmSchedule {
    fn default() -> Self {
        Self::from_timing(&TimingConfig::default())
    }
}

/// What the session should do after a confirmation read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmStep {
    /// The tick belongs to a request that is no longer pending.
    Stale,
    Retry { attempt: u32, delay: Duration },
    Confirmed(OutputDevice),
    Undetermined,
}

struct PendingSwitch {
    generation: u64,
    target: SwitchTarget,
    responder: Option<SwitchResponder>,
}

/// Issues route commands and confirms them against the route the OS reports.
pub struct ChangeSupervisor {
    schedule: ConfirmSchedule,
    generation: u64,
    pending: Option<PendingSwitch>,
}

impl ChangeSupervisor {
    pub fn new(schedule: ConfirmSchedule) -> Self {
        Self {
            schedule,
            generation: 0,
            pending: None,
        }
    }

    pub fn schedule(&self) -> &ConfirmSchedule {
        &self.schedule
    }

    /// True while a self-initiated switch awaits confirmation.
    pub fn is_in_progress(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| p.generation == generation)
    }

    /// Validate `target`, issue the command and supersede any pending request.
    ///
    /// Returns the generation whose confirmation ticks should be scheduled.
    /// Validation failures leave both OS state and any pending request untouched.
    /// A failed command also leaves a pending predecessor in place, so its
    /// confirmation still reports the route the OS ends up on.
    pub fn start<A: AudioRouteInterface + ?Sized>(
        &mut self,
        backend: &A,
        target: SwitchTarget,
    ) -> Result<u64, RouteError> {
        info!("Switch requested: {}", target);

        if target.needs_enumeration() {
            let snapshot = backend.read_snapshot().map_err(|e| {
                warn!("Could not enumerate audio endpoints: {:#}", e);
                RouteError::NoInputs(e.to_string())
            })?;
            target.ensure_available(&snapshot)?;
        }

        if let Err(e) = backend.apply_route(&target) {
            error!("Error switching audio output to {}: {:#}", target, e);
            if let Some(pending) = &self.pending {
                info!(
                    "Switch to {} (generation {}) still awaiting confirmation",
                    pending.target, pending.generation
                );
            }
            return Err(RouteError::RouteChangeFailed(e.to_string()));
        }

        self.generation += 1;
        let generation = self.generation;
        let previous = self.pending.replace(PendingSwitch {
            generation,
            target: target.clone(),
            responder: None,
        });

        if let Some(previous) = previous {
            info!(
                "Superseding pending switch to {} (generation {})",
                previous.target, previous.generation
            );
            if let Some(tx) = previous.responder {
                let _ = tx.send(Ok(SwitchOutcome::Superseded));
            }
        }

        debug!("Applied route command for {} (generation {})", target, generation);
        Ok(generation)
    }

    /// Route the outcome of `generation` to `responder`.
    pub fn attach_responder(&mut self, generation: u64, responder: SwitchResponder) {
        match self.pending.as_mut() {
            Some(pending) if pending.generation == generation => {
                pending.responder = Some(responder)
            }
            _ => {
                let _ = responder.send(Ok(SwitchOutcome::Superseded));
            }
        }
    }

    /// Evaluate a confirmation read for `generation`.
    ///
    /// Terminal steps clear the pending request and answer its caller.
    pub fn confirm(
        &mut self,
        generation: u64,
        attempt: u32,
        snapshot: Result<RawSnapshot>,
    ) -> ConfirmStep {
        if !self.is_current(generation) {
            debug!("Discarding stale confirmation (generation {})", generation);
            return ConfirmStep::Stale;
        }

        let settled = match snapshot {
            Ok(snapshot) if snapshot.route_settled => Some(snapshot),
            Ok(_) => {
                debug!("Route not settled yet (attempt {})", attempt);
                None
            }
            Err(e) => {
                warn!("Failed to read route during confirmation: {:#}", e);
                None
            }
        };

        if let Some(snapshot) = settled {
            let active = reconcile(&snapshot).active;
            info!(
                "Switch confirmed on attempt {}/{}: {}",
                attempt, self.schedule.max_attempts, active.title
            );
            self.finish(SwitchOutcome::Confirmed(active.clone()));
            return ConfirmStep::Confirmed(active);
        }

        if attempt < self.schedule.max_attempts {
            let next = attempt + 1;
            return ConfirmStep::Retry {
                attempt: next,
                delay: self.schedule.delay_for(next),
            };
        }

        warn!(
            "No active device detected after {} attempts",
            self.schedule.max_attempts
        );
        self.finish(SwitchOutcome::Undetermined);
        ConfirmStep::Undetermined
    }

    /// Drop the pending request without answering it with an outcome.
    pub fn abandon(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("Abandoning pending switch to {}", pending.target);
        }
    }

    fn finish(&mut self, outcome: SwitchOutcome) {
        if let Some(pending) = self.pending.take() {
            if let Some(tx) = pending.responder {
                let _ = tx.send(Ok(outcome));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::device::BluetoothEndpoint;
    use crate::system::MockAudioRoute;

    fn supervisor() -> ChangeSupervisor {
        ChangeSupervisor::new(ConfirmSchedule::default())
    }

    #[test]
    fn test_target_from_title() {
        assert_eq!(SwitchTarget::from_title("Speaker").unwrap(), SwitchTarget::Speaker);
        assert_eq!(SwitchTarget::from_title("receiver").unwrap(), SwitchTarget::Receiver);
        assert_eq!(
            SwitchTarget::from_title("wiredHeadset").unwrap(),
            SwitchTarget::WiredHeadset
        );
        assert_eq!(
            SwitchTarget::from_title("AirPods Pro").unwrap(),
            SwitchTarget::Bluetooth("AirPods Pro".to_string())
        );
        assert!(matches!(
            SwitchTarget::from_title("  "),
            Err(RouteError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_schedule_delays() {
        let schedule = ConfirmSchedule::default();

        assert_eq!(schedule.delay_for(1), Duration::from_millis(300));
        assert_eq!(schedule.delay_for(2), Duration::from_millis(100));
        assert_eq!(schedule.delay_for(3), Duration::from_millis(200));
    }

    #[test]
    fn test_unknown_bluetooth_is_rejected_without_os_call() {
        let backend = MockAudioRoute::new();
        let mut supervisor = supervisor();

        let result = supervisor.start(
            &backend,
            SwitchTarget::Bluetooth("Nonexistent".to_string()),
        );

        assert!(matches!(result, Err(RouteError::DeviceNotFound(_))));
        assert!(backend.get_apply_calls().is_empty());
        assert!(!supervisor.is_in_progress());
    }

    #[test]
    fn test_failed_command_clears_progress() {
        let backend = MockAudioRoute::new();
        backend.set_apply_failure(Some("route rejected"));
        let mut supervisor = supervisor();

        let result = supervisor.start(&backend, SwitchTarget::Speaker);

        assert_eq!(
            result,
            Err(RouteError::RouteChangeFailed("route rejected".to_string()))
        );
        assert!(!supervisor.is_in_progress());
    }

    #[test]
    fn test_failed_command_keeps_predecessor_pending() {
        let backend = MockAudioRoute::new();
        let mut supervisor = supervisor();
        let (tx, mut rx) = oneshot::channel();

        let first = supervisor.start(&backend, SwitchTarget::Speaker).unwrap();
        supervisor.attach_responder(first, tx);
        backend.set_apply_failure(Some("rejected"));
        let result = supervisor.start(&backend, SwitchTarget::Receiver);

        assert_eq!(
            result,
            Err(RouteError::RouteChangeFailed("rejected".to_string()))
        );
        assert!(supervisor.is_current(first));
        assert!(rx.try_recv().is_err());

        let snapshot = RawSnapshot {
            speaker_on: true,
            ..RawSnapshot::default()
        };
        match supervisor.confirm(first, 1, Ok(snapshot)) {
            ConfirmStep::Confirmed(device) => assert_eq!(device.device_type, DeviceType::Speaker),
            other => panic!("unexpected step: {other:?}"),
        }
        assert!(matches!(rx.try_recv(), Ok(Ok(SwitchOutcome::Confirmed(_)))));
    }

    #[test]
    fn test_read_failure_maps_to_no_inputs() {
        let backend = MockAudioRoute::new();
        backend.set_read_failure(true);
        let mut supervisor = supervisor();

        let result = supervisor.start(&backend, SwitchTarget::WiredHeadset);

        assert!(matches!(result, Err(RouteError::NoInputs(_))));
        assert!(backend.get_apply_calls().is_empty());
    }

    #[test]
    fn test_confirm_reports_actual_route() {
        let backend = MockAudioRoute::new();
        let mut supervisor = supervisor();
        let generation = supervisor
            .start(&backend, SwitchTarget::Speaker)
            .unwrap();

        let snapshot = RawSnapshot {
            wired_headset_on: true,
            ..RawSnapshot::default()
        };
        let step = supervisor.confirm(generation, 1, Ok(snapshot));

        match step {
            ConfirmStep::Confirmed(device) => {
                assert_eq!(device.device_type, DeviceType::WiredHeadset)
            }
            other => panic!("unexpected step: {other:?}"),
        }
        assert!(!supervisor.is_in_progress());
    }

    #[test]
    fn test_confirm_retries_then_gives_up() {
        let backend = MockAudioRoute::new();
        let mut supervisor = supervisor();
        let generation = supervisor
            .start(&backend, SwitchTarget::Receiver)
            .unwrap();
        let unsettled = RawSnapshot {
            route_settled: false,
            ..RawSnapshot::default()
        };

        assert_eq!(
            supervisor.confirm(generation, 1, Ok(unsettled.clone())),
            ConfirmStep::Retry {
                attempt: 2,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            supervisor.confirm(generation, 2, Err(anyhow::anyhow!("busy"))),
            ConfirmStep::Retry {
                attempt: 3,
                delay: Duration::from_millis(200)
            }
        );
        assert_eq!(
            supervisor.confirm(generation, 3, Ok(unsettled)),
            ConfirmStep::Undetermined
        );
        assert!(!supervisor.is_in_progress());
    }

    #[test]
    fn test_new_request_supersedes_pending() {
        let backend = MockAudioRoute::new();
        backend.set_snapshot(RawSnapshot {
            bluetooth_devices: vec![BluetoothEndpoint::new("Buds")],
            ..RawSnapshot::default()
        });
        let mut supervisor = supervisor();
        let (tx, mut rx) = oneshot::channel();

        let first = supervisor.start(&backend, SwitchTarget::Speaker).unwrap();
        supervisor.attach_responder(first, tx);
        let second = supervisor
            .start(&backend, SwitchTarget::Bluetooth("Buds".to_string()))
            .unwrap();

        assert_eq!(rx.try_recv().unwrap(), Ok(SwitchOutcome::Superseded));
        assert_eq!(
            supervisor.confirm(first, 1, Ok(RawSnapshot::default())),
            ConfirmStep::Stale
        );
        assert!(supervisor.is_current(second));
    }
}
