use anyhow::{Result, anyhow};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::config::SimulatorConfig;
use crate::route::{BluetoothEndpoint, ChangeSource, OutputDevice, RawSnapshot, SwitchTarget};
use crate::system::traits::{
    AudioRouteInterface, ChangeCallback, FileSystemInterface, PickerAnchor, PickerInterface,
    SelectionCallback,
};

/// Apply a route command to raw flags the way the mobile OS audio manager does.
///
/// Returns the broadcasts the OS would fire for the flags that changed.
pub fn apply_flag_model(snapshot: &mut RawSnapshot, target: &SwitchTarget) -> Result<Vec<ChangeSource>> {
    let before = (snapshot.speaker_on, snapshot.bluetooth_on);

    match target {
        SwitchTarget::Speaker => {
            snapshot.bluetooth_on = false;
            snapshot.speaker_on = true;
        }
        SwitchTarget::Receiver | SwitchTarget::WiredHeadset => {
            snapshot.bluetooth_on = false;
            snapshot.speaker_on = false;
        }
        SwitchTarget::Bluetooth(name) => {
            if !snapshot.has_bluetooth_device(name) {
                return Err(anyhow!("Bluetooth device '{}' is not connected", name));
            }
            snapshot.speaker_on = false;
            snapshot.bluetooth_on = true;
        }
    }

    let preferred = match target {
        SwitchTarget::Bluetooth(name) => Some(name.as_str()),
        _ => None,
    };
    for endpoint in &mut snapshot.bluetooth_devices {
        endpoint.active = preferred == Some(endpoint.name.as_str());
    }

    let mut broadcasts = Vec::new();
    if before.0 != snapshot.speaker_on {
        broadcasts.push(ChangeSource::SpeakerphoneChanged);
    }
    if before.1 != snapshot.bluetooth_on {
        broadcasts.push(ChangeSource::ScoStateChanged);
    }
    if preferred.is_some() {
        broadcasts.push(ChangeSource::MediaRouteSelected);
    }
    Ok(broadcasts)
}

/// In-process audio route backend that models OS route flags.
///
/// Used by the CLI to drive a session without a device attached.
#[derive(Clone)]
pub struct SimulatedAudioRoute {
    state: Arc<Mutex<RawSnapshot>>,
    listeners: Arc<Mutex<Vec<ChangeCallback>>>,
}

impl SimulatedAudioRoute {
    pub fn new(initial: RawSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(initial)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(config.to_snapshot())
    }

    /// Plug or unplug the wired headset
    pub fn set_wired_headset(&self, connected: bool) {
        self.update(ChangeSource::HeadsetPlug, |s| s.wired_headset_on = connected);
    }

    pub fn connect_bluetooth(&self, name: &str) {
        self.update(ChangeSource::BluetoothConnection, |s| {
            if !s.has_bluetooth_device(name) {
                s.bluetooth_devices.push(BluetoothEndpoint::new(name));
            }
        });
    }

    pub fn disconnect_bluetooth(&self, name: &str) {
        self.update(ChangeSource::BluetoothConnection, |s| {
            s.bluetooth_devices.retain(|d| d.name != name);
            if s.bluetooth_devices.is_empty() {
                s.bluetooth_on = false;
            }
        });
    }

    fn update(&self, source: ChangeSource, change: impl FnOnce(&mut RawSnapshot)) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            change(&mut *state);
        }
        self.broadcast(&[source]);
    }

    fn broadcast(&self, sources: &[ChangeSource]) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for source in sources {
            debug!("Broadcasting {:?} to {} listeners", source, listeners.len());
            for listener in listeners.iter() {
                listener(*source);
            }
        }
    }
}

impl AudioRouteInterface for SimulatedAudioRoute {
    fn read_snapshot(&self) -> Result<RawSnapshot> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("Simulated route state is poisoned"))?;
        Ok(state.clone())
    }

    fn apply_route(&self, target: &SwitchTarget) -> Result<()> {
        let broadcasts = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| anyhow!("Simulated route state is poisoned"))?;
            apply_flag_model(&mut state, target)?
        };
        info!("Simulated route set to {}", target);
        self.broadcast(&broadcasts);
        Ok(())
    }

    fn add_route_change_listener(&self, callback: ChangeCallback) -> Result<()> {
        self.listeners
            .lock()
            .map_err(|_| anyhow!("Simulated listener list is poisoned"))?
            .push(callback);
        Ok(())
    }
}

impl Default for SimulatedAudioRoute {
    fn default() -> Self {
        Self::new(RawSnapshot::default())
    }
}

struct OpenPicker {
    candidates: Vec<OutputDevice>,
    on_select: SelectionCallback,
}

/// Picker that lists the candidates on stdout and waits for the user to pick
/// one by number or title through [`ConsolePicker::select`].
#[derive(Clone, Default)]
pub struct ConsolePicker {
    open: Arc<Mutex<Option<OpenPicker>>>,
}

impl ConsolePicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Resolve the open picker with `input`: a 1-based index or a title.
    ///
    /// Returns the selected title. Unmatched input leaves the picker open.
    pub fn select(&self, input: &str) -> Option<String> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let picker = open.as_ref()?;

        let input = input.trim();
        let title = match input.parse::<usize>() {
            Ok(index) => picker
                .candidates
                .get(index.checked_sub(1)?)
                .map(|device| device.title.clone()),
            Err(_) => picker
                .candidates
                .iter()
                .find(|device| device.title.eq_ignore_ascii_case(input))
                .map(|device| device.title.clone()),
        }?;

        let picker = open.take()?;
        drop(open);
        info!("Picker selection: {}", title);
        (picker.on_select)(title.clone());
        Some(title)
    }
}

impl PickerInterface for ConsolePicker {
    fn present(
        &self,
        anchor: PickerAnchor,
        candidates: Vec<OutputDevice>,
        on_select: SelectionCallback,
    ) -> Result<()> {
        println!(
            "Audio output picker at ({}, {}) [{}x{}]:",
            anchor.x, anchor.y, anchor.width, anchor.height
        );
        for (i, device) in candidates.iter().enumerate() {
            println!("  {}. {}", i + 1, device);
        }
        println!("Enter a number or title to select");

        let mut open = self
            .open
            .lock()
            .map_err(|_| anyhow!("Console picker state is poisoned"))?;
        if open.is_some() {
            debug!("Replacing open picker");
        }
        *open = Some(OpenPicker {
            candidates,
            on_select,
        });
        Ok(())
    }
}

/// Production implementation of FileSystemInterface using std::fs
pub struct StandardFileSystem;

impl FileSystemInterface for StandardFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file: {}", e))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .map_err(|e| anyhow!("Failed to write config file: {}", e))
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| anyhow!("Failed to create config directory: {}", e))
    }
}

impl Default for StandardFileSystem {
    fn default() -> Self {
        Self
    }
}
