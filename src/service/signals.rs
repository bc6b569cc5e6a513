use anyhow::Result;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// SIGTERM or SIGINT
    Shutdown,
    /// SIGHUP
    Reload,
}

impl SignalType {
    pub fn from_raw(signal: i32) -> Option<Self> {
        match signal {
            SIGTERM | SIGINT => Some(SignalType::Shutdown),
            SIGHUP => Some(SignalType::Reload),
            _ => None,
        }
    }
}

/// Forwards process signals to the `watch` loop
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    signal_sender: mpsc::UnboundedSender<SignalType>,
}

impl SignalHandler {
    pub fn new(signal_sender: mpsc::UnboundedSender<SignalType>) -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            signal_sender,
        }
    }

    /// Listen until a shutdown signal arrives or the receiver goes away
    pub async fn listen_for_signals(&self) -> Result<()> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;
        let handle = signals.handle();

        info!("Signal handler initialized, listening for SIGTERM, SIGINT, SIGHUP");

        while let Some(signal) = signals.next().await {
            let Some(signal_type) = SignalType::from_raw(signal) else {
                warn!("Received unexpected signal: {}", signal);
                continue;
            };

            match signal_type {
                SignalType::Shutdown => {
                    info!("Received shutdown signal ({}), stopping", signal);
                    self.shutdown_flag.store(true, Ordering::Relaxed);
                }
                SignalType::Reload => info!("Received SIGHUP signal, reloading configuration"),
            }

            if let Err(e) = self.signal_sender.send(signal_type) {
                warn!("Failed to forward {:?}: receiver closed", e.0);
                break;
            }

            if signal_type == SignalType::Shutdown {
                break;
            }
        }

        handle.close();
        Ok(())
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_classification() {
        assert_eq!(SignalType::from_raw(SIGTERM), Some(SignalType::Shutdown));
        assert_eq!(SignalType::from_raw(SIGINT), Some(SignalType::Shutdown));
        assert_eq!(SignalType::from_raw(SIGHUP), Some(SignalType::Reload));
        assert_eq!(SignalType::from_raw(SIGUSR1), None);
    }

    #[test]
    fn test_new_handler_has_no_pending_shutdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = SignalHandler::new(tx);
        assert!(!handler.is_shutdown_requested());
    }
}
