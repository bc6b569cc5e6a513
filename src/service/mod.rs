pub mod daemon;
pub mod signals;

pub use daemon::{LoopControl, ServiceManager};
pub use signals::{SignalHandler, SignalType};
