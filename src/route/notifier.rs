use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::device::{OutputDevice, RouteEvent, RouteKey};
use super::source::RouteChangeReason;

pub type EventSink = UnboundedSender<RouteEvent>;

/// What the subscriber was last told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emitted {
    Route(RouteKey),
    Undetermined,
}

/// Emits `audioRouteChanged` events, skipping repeats of the last reported route.
#[derive(Debug, Default)]
pub struct EventNotifier {
    last_emitted: Option<Emitted>,
    sink: Option<EventSink>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the single subscriber, replacing any previous one.
    pub fn attach(&mut self, sink: EventSink) {
        if self.sink.replace(sink).is_some() {
            debug!("Replacing existing event subscriber");
        }
        info!("Event stream listener registered");
    }

    pub fn detach(&mut self) {
        if self.sink.take().is_some() {
            info!("Event stream listener cancelled");
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.sink.is_some()
    }

    pub fn last_emitted(&self) -> Option<&Emitted> {
        self.last_emitted.as_ref()
    }

    /// Report `active` only if it differs from the last emitted route.
    ///
    /// While `suppressed` is set nothing is emitted and the last route is left
    /// untouched. Returns whether an event was emitted.
    pub fn notify_if_changed(&mut self, active: &OutputDevice, suppressed: bool) -> bool {
        self.notify_change(active, suppressed, None)
    }

    /// [`notify_if_changed`](Self::notify_if_changed) carrying the OS reason
    /// that triggered the check.
    pub fn notify_change(
        &mut self,
        active: &OutputDevice,
        suppressed: bool,
        reason: Option<RouteChangeReason>,
    ) -> bool {
        if suppressed {
            debug!(
                "Route change to {} ignored - handling our own change",
                active.title
            );
            return false;
        }

        let emitted = Emitted::Route(active.key());
        if self.last_emitted.as_ref() == Some(&emitted) {
            debug!("Active route unchanged ({})", active.title);
            return false;
        }

        info!("Route changed externally to: {}", active.title);
        self.last_emitted = Some(emitted);
        self.send(RouteEvent::changed(active).with_reason(reason));
        true
    }

    /// Report `active` regardless of the last emitted route.
    pub fn force(&mut self, active: &OutputDevice) {
        self.last_emitted = Some(Emitted::Route(active.key()));
        self.send(RouteEvent::changed(active));
    }

    /// Report a route change whose active device could not be determined.
    pub fn undetermined(&mut self) {
        warn!("Audio route changed but no active device detected");
        self.last_emitted = Some(Emitted::Undetermined);
        self.send(RouteEvent::undetermined());
    }

    /// Report an undetermined route unless that was already the last report.
    ///
    /// Any determined route differs from the undetermined state, so the next
    /// one is always reported. Returns whether an event was emitted.
    pub fn notify_undetermined(&mut self, reason: Option<RouteChangeReason>) -> bool {
        if self.last_emitted == Some(Emitted::Undetermined) {
            debug!("Active route still undetermined");
            return false;
        }

        warn!("Audio route changed but no active device detected");
        self.last_emitted = Some(Emitted::Undetermined);
        self.send(RouteEvent::undetermined().with_reason(reason));
        true
    }

    fn send(&mut self, event: RouteEvent) {
        let Some(sink) = &self.sink else {
            warn!("No event sink available");
            return;
        };

        match event.active_device() {
            Some(device) => info!(
                "Sent device event: {} (type: {})",
                device.title, device.device_type
            ),
            None => info!("Sent route event without active device"),
        }

        if sink.send(event).is_err() {
            warn!("Event subscriber went away, dropping sink");
            self.sink = None;
        }
    }
}
