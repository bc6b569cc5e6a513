//! One route session per host attachment.
//!
//! The session owns every piece of mutable routing state (last reported route,
//! pending switch, subscriber) and processes all work on a single tokio task.
//! Handles talk to it over a channel; delayed work is posted back through a
//! weak sender so timers outliving the session are simply discarded.

use anyhow::Result;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::TimingConfig;
use crate::error::RouteError;
use crate::system::{AudioRouteInterface, PickerAnchor, PickerInterface};

use super::device::{OutputDevice, RouteEvent};
use super::notifier::EventNotifier;
use super::reconciler::reconcile;
use super::source::{ChangeSource, RouteChangeReason};
use super::supervisor::{
    ChangeSupervisor, ConfirmSchedule, ConfirmStep, SwitchOutcome, SwitchResponder, SwitchTarget,
};

enum Command {
    Subscribe(mpsc::UnboundedSender<RouteEvent>),
    Unsubscribe,
    Query(oneshot::Sender<Result<Vec<OutputDevice>, RouteError>>),
    Switch {
        target: SwitchTarget,
        responder: Option<SwitchResponder>,
    },
    ShowPicker(PickerAnchor),
    External(ChangeSource),
    Timer(Timer),
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    InitialState { subscription: u64 },
    Check {
        attempt: u32,
        reason: Option<RouteChangeReason>,
    },
    Confirm { generation: u64, attempt: u32 },
}

/// Cloneable front door to a running [`RouteSession`].
#[derive(Clone)]
pub struct RouteSessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RouteSessionHandle {
    /// Start receiving route events. Replaces any previous subscriber.
    pub fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<RouteEvent>, RouteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(Command::Subscribe(tx))?;
        Ok(rx)
    }

    pub fn unsubscribe(&self) -> Result<(), RouteError> {
        self.send(Command::Unsubscribe)
    }

    /// Snapshot, reconcile and return the candidate outputs.
    pub async fn available_outputs(&self) -> Result<Vec<OutputDevice>, RouteError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Query(tx))?;
        rx.await.map_err(|_| RouteError::SessionClosed)?
    }

    /// Switch to the output named `title` and wait for the confirmed route.
    pub async fn change_audio_output(&self, title: &str) -> Result<SwitchOutcome, RouteError> {
        let target = SwitchTarget::from_title(title)?;
        self.request_switch(target).await
    }

    pub async fn request_switch(&self, target: SwitchTarget) -> Result<SwitchOutcome, RouteError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Switch {
            target,
            responder: Some(tx),
        })?;
        rx.await.map_err(|_| RouteError::SessionClosed)?
    }

    /// Present the native picker. Fire-and-forget.
    pub fn show_picker(&self, anchor: PickerAnchor) -> Result<(), RouteError> {
        self.send(Command::ShowPicker(anchor))
    }

    /// Feed an external change signal into the session.
    pub fn notify_external_change(&self, source: ChangeSource) -> Result<(), RouteError> {
        self.send(Command::External(source))
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Resolves once the session task has exited.
    pub async fn stopped(&self) {
        self.commands.closed().await
    }

    fn send(&self, command: Command) -> Result<(), RouteError> {
        self.commands
            .send(command)
            .map_err(|_| RouteError::SessionClosed)
    }
}

/// Route state for one host attachment, driven by [`RouteSession::spawn`].
pub struct RouteSession<A, P> {
    backend: A,
    picker: P,
    timing: TimingConfig,
    notifier: EventNotifier,
    supervisor: ChangeSupervisor,
    subscription: u64,
    /// An external check is scheduled or retrying.
    check_pending: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    timers: mpsc::WeakUnboundedSender<Command>,
}

impl<A, P> RouteSession<A, P>
where
    A: AudioRouteInterface + Send + Sync + 'static,
    P: PickerInterface + Send + Sync + 'static,
{
    /// Register for OS change notifications and start the session task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(backend: A, picker: P, timing: &TimingConfig) -> Result<RouteSessionHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();

        let listener = weak.clone();
        backend.add_route_change_listener(Box::new(move |source| {
            if let Some(tx) = listener.upgrade() {
                let _ = tx.send(Command::External(source));
            }
        }))?;

        let session = Self {
            backend,
            picker,
            timing: timing.clone(),
            notifier: EventNotifier::new(),
            supervisor: ChangeSupervisor::new(ConfirmSchedule::from_timing(timing)),
            subscription: 0,
            check_pending: false,
            commands: rx,
            timers: weak,
        };

        tokio::spawn(session.run());
        info!("Route session started");

        Ok(RouteSessionHandle { commands: tx })
    }

    async fn run(mut self) {
        let poll_period = Duration::from_millis(self.timing.poll_interval_ms);
        let mut poll = (!poll_period.is_zero()).then(|| {
            let mut interval = time::interval_at(time::Instant::now() + poll_period, poll_period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let command = tokio::select! {
                command = self.commands.recv() => command,
                _ = tick(&mut poll) => Some(Command::External(ChangeSource::Poll)),
            };

            match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => self.handle(command),
            }
        }

        self.supervisor.abandon();
        self.notifier.detach();
        info!("Route session stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe(sink) => {
                self.notifier.attach(sink);
                self.subscription += 1;
                let delay = Duration::from_millis(self.timing.subscribe_delay_ms);
                self.schedule(
                    delay,
                    Timer::InitialState {
                        subscription: self.subscription,
                    },
                );
            }
            Command::Unsubscribe => self.notifier.detach(),
            Command::Query(tx) => {
                let _ = tx.send(self.available_outputs());
            }
            Command::Switch { target, responder } => self.start_switch(target, responder),
            Command::ShowPicker(anchor) => self.show_picker(anchor),
            Command::External(source) => self.on_external(source),
            Command::Timer(timer) => self.on_timer(timer),
            Command::Shutdown => {}
        }
    }

    fn available_outputs(&self) -> Result<Vec<OutputDevice>, RouteError> {
        let snapshot = self
            .backend
            .read_snapshot()
            .map_err(|e| RouteError::ReadFailed(e.to_string()))?;
        let candidates = reconcile(&snapshot).candidates;
        info!("Available audio outputs: {} devices", candidates.len());
        Ok(candidates)
    }

    fn start_switch(&mut self, target: SwitchTarget, responder: Option<SwitchResponder>) {
        match self.supervisor.start(&self.backend, target) {
            Ok(generation) => {
                if let Some(tx) = responder {
                    self.supervisor.attach_responder(generation, tx);
                }
                let delay = self.supervisor.schedule().delay_for(1);
                self.schedule(
                    delay,
                    Timer::Confirm {
                        generation,
                        attempt: 1,
                    },
                );
            }
            Err(e) => {
                error!("Error changing audio output: {}", e);
                if let Some(tx) = responder {
                    let _ = tx.send(Err(e));
                }
            }
        }
    }

    fn show_picker(&mut self, anchor: PickerAnchor) {
        let candidates = match self.available_outputs() {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Error showing audio output picker: {}", e);
                return;
            }
        };

        let commands = self.timers.clone();
        let on_select = Box::new(move |title: String| {
            let target = match SwitchTarget::from_title(&title) {
                Ok(target) => target,
                Err(e) => {
                    warn!("Ignoring picker selection '{}': {}", title, e);
                    return;
                }
            };
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::Switch {
                    target,
                    responder: None,
                });
            }
        });

        match self.picker.present(anchor, candidates, on_select) {
            Ok(()) => debug!("Audio output picker shown at ({}, {})", anchor.x, anchor.y),
            Err(e) => error!("Error showing audio output picker: {:#}", e),
        }
    }

    fn on_external(&mut self, source: ChangeSource) {
        if !source.is_relevant() {
            debug!("Audio route change ignored - source: {:?}", source);
            return;
        }

        if self.check_pending {
            debug!("Route check already pending, folding in {:?}", source);
            return;
        }

        let delay = source.check_delay(&self.timing);
        debug!("External change from {:?}, checking in {:?}", source, delay);

        let reason = source.reason();
        self.check_pending = true;
        if delay.is_zero() {
            self.check_route(1, reason);
        } else {
            self.schedule(delay, Timer::Check { attempt: 1, reason });
        }
    }

    fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::InitialState { subscription } => {
                if subscription != self.subscription || !self.notifier.has_subscriber() {
                    debug!("Discarding initial-state timer for stale subscription");
                    return;
                }
                self.send_current_route();
            }
            Timer::Check { attempt, reason } => self.check_route(attempt, reason),
            Timer::Confirm {
                generation,
                attempt,
            } => {
                let snapshot = self.backend.read_snapshot();
                match self.supervisor.confirm(generation, attempt, snapshot) {
                    ConfirmStep::Stale => {}
                    ConfirmStep::Retry { attempt, delay } => {
                        self.schedule(
                            delay,
                            Timer::Confirm {
                                generation,
                                attempt,
                            },
                        );
                    }
                    ConfirmStep::Confirmed(active) => self.notifier.force(&active),
                    ConfirmStep::Undetermined => self.notifier.undetermined(),
                }
            }
        }
    }

    fn send_current_route(&mut self) {
        match self.backend.read_snapshot() {
            Ok(snapshot) if snapshot.route_settled => {
                let active = reconcile(&snapshot).active;
                info!("Sending initial route: {}", active.title);
                self.notifier.force(&active);
            }
            Ok(_) => self.notifier.undetermined(),
            Err(e) => warn!("Could not read initial route: {:#}", e),
        }
    }

    /// Externally triggered reconciliation, retried while the route is unsettled.
    ///
    /// Only one check chain runs at a time; external signals arriving while it
    /// is pending are covered by its next read.
    fn check_route(&mut self, attempt: u32, reason: Option<RouteChangeReason>) {
        self.check_pending = false;
        let suppressed = self.supervisor.is_in_progress();

        let snapshot = match self.backend.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to read audio route: {:#}", e);
                return;
            }
        };

        let schedule = *self.supervisor.schedule();
        debug!(
            "Audio route check (attempt {}/{})",
            attempt, schedule.max_attempts
        );

        if snapshot.route_settled {
            let active = reconcile(&snapshot).active;
            self.notifier.notify_change(&active, suppressed, reason);
        } else if suppressed {
            debug!("Unsettled route ignored - handling our own change");
        } else if attempt < schedule.max_attempts {
            let delay = schedule.retry_step * (attempt + 1);
            debug!("No active device detected, retrying in {:?}", delay);
            self.check_pending = true;
            self.schedule(
                delay,
                Timer::Check {
                    attempt: attempt + 1,
                    reason,
                },
            );
        } else {
            self.notifier.notify_undetermined(reason);
        }
    }

    fn schedule(&self, delay: Duration, timer: Timer) {
        let commands = self.timers.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            match commands.upgrade() {
                Some(tx) => {
                    let _ = tx.send(Command::Timer(timer));
                }
                None => debug!("Session gone, dropping {:?}", timer),
            }
        });
    }
}

async fn tick(poll: &mut Option<time::Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
