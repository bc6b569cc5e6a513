use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::signals::{SignalHandler, SignalType};
use crate::channel::{self, MethodCall, MethodResponse};
use crate::config::{Config, ConfigLoader};
use crate::error::RouteError;
use crate::route::{RouteEvent, RouteSession, RouteSessionHandle};
use crate::system::{ConsolePicker, FileSystemInterface, SimulatedAudioRoute};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Runs a route session against the simulated backend for `watch`.
///
/// Events are printed as event-channel JSON, stdin lines are treated as
/// method calls (or as the selection while the picker is open), and SIGHUP
/// rebuilds the session from a reloaded config.
pub struct ServiceManager<F: FileSystemInterface> {
    config_loader: ConfigLoader<F>,
    config: Config,
    backend: Option<SimulatedAudioRoute>,
    picker: ConsolePicker,
    session: Option<RouteSessionHandle>,
    events: Option<mpsc::UnboundedReceiver<RouteEvent>>,
}

impl<F: FileSystemInterface> ServiceManager<F> {
    pub fn new(config_loader: ConfigLoader<F>) -> Result<Self> {
        let config = config_loader.load_config()?;
        Ok(Self {
            config_loader,
            config,
            backend: None,
            picker: ConsolePicker::new(),
            session: None,
            events: None,
        })
    }

    /// Spawn a fresh session and subscribe to its events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_session(&mut self) -> Result<()> {
        let backend = SimulatedAudioRoute::from_config(&self.config.simulator);
        let picker = ConsolePicker::new();
        let session = RouteSession::spawn(backend.clone(), picker.clone(), &self.config.timing)
            .context("Failed to start route session")?;
        let events = session
            .subscribe()
            .context("Failed to subscribe to route events")?;

        self.backend = Some(backend);
        self.picker = picker;
        self.session = Some(session);
        self.events = Some(events);
        Ok(())
    }

    pub fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
        self.events = None;
        self.backend = None;
    }

    /// React to a forwarded process signal.
    pub fn handle_signal(&mut self, signal: SignalType) -> LoopControl {
        match signal {
            SignalType::Shutdown => {
                info!("Shutdown signal received, stopping");
                LoopControl::Stop
            }
            SignalType::Reload => {
                if let Err(e) = self.reload_config() {
                    error!("Failed to reload configuration: {:#}", e);
                }
                LoopControl::Continue
            }
        }
    }

    /// Reload the configuration and restart the session with it.
    ///
    /// An invalid file keeps the running session untouched.
    pub fn reload_config(&mut self) -> Result<()> {
        info!("Reloading configuration");
        let new_config = self.config_loader.reload_config()?;

        self.stop_session();
        self.config = new_config;
        self.start_session()?;

        info!("Configuration reloaded, route session restarted");
        Ok(())
    }

    /// Answer one stdin line as a method call, or as the picker selection.
    pub async fn handle_line(&self, line: &str) -> Result<String> {
        if self.picker.is_open() && !line.starts_with('{') {
            return match self.picker.select(line) {
                Some(title) => Ok(format!("Selected {title}")),
                None => bail!("No picker entry matches '{line}'"),
            };
        }

        let call: MethodCall = serde_json::from_str(line)
            .with_context(|| format!("Invalid method call: {line}"))?;

        let response = match &self.session {
            Some(session) => channel::dispatch(session, call).await,
            None => MethodResponse::error(&RouteError::SessionClosed),
        };
        Ok(serde_json::to_string(&response)?)
    }

    /// Main loop: events, stdin method calls and signals.
    pub async fn run(&mut self) -> Result<()> {
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<SignalType>();
        let signal_handler = SignalHandler::new(signal_tx);
        tokio::spawn(async move {
            if let Err(e) = signal_handler.listen_for_signals().await {
                error!("Signal handler error: {}", e);
            }
        });

        self.start_session()?;
        info!("Watching audio route, send method calls as JSON lines on stdin");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                signal = signal_rx.recv() => {
                    let control = match signal {
                        Some(signal) => self.handle_signal(signal),
                        None => {
                            warn!("Signal channel closed");
                            LoopControl::Stop
                        }
                    };
                    if control == LoopControl::Stop {
                        break;
                    }
                }
                event = next_event(&mut self.events) => match event {
                    Some(event) => print_event(&event),
                    None => {
                        warn!("Event stream closed");
                        break;
                    }
                },
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match self.handle_line(line.trim()).await {
                        Ok(response) => println!("{response}"),
                        Err(e) => warn!("{:#}", e),
                    },
                    Ok(None) => {
                        debug!("stdin closed, continuing with events only");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                },
            }
        }

        self.stop_session();
        info!("Watch stopped");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> Option<&RouteSessionHandle> {
        self.session.as_ref()
    }

    /// The simulated backend of the running session
    pub fn backend(&self) -> Option<&SimulatedAudioRoute> {
        self.backend.as_ref()
    }

    /// Receive the next event from the running session (for testing)
    #[cfg(any(test, feature = "test-mocks"))]
    pub async fn next_event(&mut self) -> Option<RouteEvent> {
        next_event(&mut self.events).await
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<RouteEvent>>) -> Option<RouteEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn print_event(event: &RouteEvent) {
    match channel::encode_event(event) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("Failed to encode route event: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::DeviceType;
    use crate::system::MockFileSystem;
    use std::path::PathBuf;

    fn manager_with(content: &str) -> (MockFileSystem, ServiceManager<MockFileSystem>) {
        let mock_fs = MockFileSystem::new();
        let path = PathBuf::from("/test/config.toml");
        mock_fs.add_file(&path, content.to_string());
        let manager = ServiceManager::new(ConfigLoader::new(mock_fs.clone(), path)).unwrap();
        (mock_fs, manager)
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_reports_initial_route() {
        let (_fs, mut manager) = manager_with("[simulator]\nspeaker_on = true\n");
        manager.start_session().unwrap();

        let event = manager.next_event().await.unwrap();

        assert_eq!(
            event.active_device().map(|d| d.device_type),
            Some(DeviceType::Speaker)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_rebuilds_session_from_new_config() {
        let (fs, mut manager) = manager_with("[simulator]\nspeaker_on = true\n");
        manager.start_session().unwrap();
        let first = manager.session().unwrap().clone();

        fs.add_file(
            "/test/config.toml",
            "[simulator]\nwired_headset_on = true\n".to_string(),
        );
        assert_eq!(manager.handle_signal(SignalType::Reload), LoopControl::Continue);

        assert!(manager.config().simulator.wired_headset_on);
        let event = manager.next_event().await.unwrap();
        assert_eq!(
            event.active_device().map(|d| d.device_type),
            Some(DeviceType::WiredHeadset)
        );

        tokio::task::yield_now().await;
        assert!(!first.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_reload_keeps_running_session() {
        let (fs, mut manager) = manager_with("");
        manager.start_session().unwrap();

        fs.add_file("/test/config.toml", "[timing]\nmax_confirm_attempts = 0\n".to_string());
        assert_eq!(manager.handle_signal(SignalType::Reload), LoopControl::Continue);

        assert_eq!(manager.config().timing.max_confirm_attempts, 3);
        assert!(manager.session().unwrap().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_stops_loop() {
        let (_fs, mut manager) = manager_with("");
        assert_eq!(manager.handle_signal(SignalType::Shutdown), LoopControl::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_line_dispatches_method_call() {
        let (_fs, mut manager) = manager_with("");
        manager.start_session().unwrap();

        let response = manager
            .handle_line(r#"{"method":"changeAudioOutput","arguments":{"deviceTitle":"wiredHeadset"}}"#)
            .await
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], "DEVICE_NOT_FOUND");
        assert!(manager.handle_line("not json").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_picker_selection_from_stdin_switches_route() {
        let (_fs, mut manager) = manager_with("");
        manager.start_session().unwrap();
        let initial = manager.next_event().await.unwrap();
        assert_eq!(
            initial.active_device().map(|d| d.device_type),
            Some(DeviceType::Receiver)
        );

        manager
            .handle_line(r#"{"method":"showAudioOutputMenu","arguments":{"x":10,"y":20}}"#)
            .await
            .unwrap();
        manager
            .handle_line(r#"{"method":"getAvailableAudioOutputs"}"#)
            .await
            .unwrap();

        assert!(manager.handle_line("9").await.is_err());
        assert_eq!(manager.handle_line("1").await.unwrap(), "Selected speaker");

        let event = manager.next_event().await.unwrap();
        assert_eq!(
            event.active_device().map(|d| d.device_type),
            Some(DeviceType::Speaker)
        );
    }
}
