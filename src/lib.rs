pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod route;
pub mod service;
pub mod system;

pub use channel::{MethodCall, MethodResponse, dispatch};
pub use config::{Config, ConfigLoader};
pub use error::RouteError;
pub use route::{OutputDevice, RouteEvent, RouteSession, RouteSessionHandle};

#[cfg(any(test, feature = "test-mocks"))]
pub use system::{MockAudioRoute, MockFileSystem, MockPicker};
