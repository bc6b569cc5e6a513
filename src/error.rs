use thiserror::Error;

/// Errors returned to the caller of a route command.
///
/// Observation-path problems never surface here; they are logged and the
/// session simply reports no change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("{0}")]
    InvalidArguments(String),
    #[error("No audio inputs available: {0}")]
    NoInputs(String),
    #[error("{0}")]
    DeviceNotFound(String),
    #[error("Audio route change failed: {0}")]
    RouteChangeFailed(String),
    #[error("Failed to read audio route state: {0}")]
    ReadFailed(String),
    #[error("Route session is no longer running")]
    SessionClosed,
}

impl RouteError {
    /// Error code reported on the method channel.
    pub fn code(&self) -> &'static str {
        match self {
            RouteError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            RouteError::NoInputs(_) => "NO_INPUTS",
            RouteError::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            RouteError::RouteChangeFailed(_)
            | RouteError::ReadFailed(_)
            | RouteError::SessionClosed => "AUDIO_ROUTE_ERROR",
        }
    }
}
