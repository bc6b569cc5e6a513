pub mod device;
pub mod notifier;
pub mod reconciler;
pub mod session;
pub mod source;
pub mod supervisor;

pub use device::{BluetoothEndpoint, DeviceType, OutputDevice, RawSnapshot, RouteEvent, RouteKey};
pub use notifier::{Emitted, EventNotifier};
pub use reconciler::{Reconciliation, reconcile};
pub use session::{RouteSession, RouteSessionHandle};
pub use source::{ChangeSource, RouteChangeReason};
pub use supervisor::{ChangeSupervisor, ConfirmSchedule, SwitchOutcome, SwitchTarget};
