use anyhow::Result;
use std::path::Path;

use crate::route::{ChangeSource, OutputDevice, RawSnapshot, SwitchTarget};

pub type ChangeCallback = Box<dyn Fn(ChangeSource) + Send + Sync>;
pub type SelectionCallback = Box<dyn FnOnce(String) + Send>;

/// Trait for OS audio routing operations - abstracts AudioManager / AVAudioSession
pub trait AudioRouteInterface {
    /// Read the current routing flags and enumerated Bluetooth endpoints.
    /// Must be cheap enough to call several times per second.
    fn read_snapshot(&self) -> Result<RawSnapshot>;

    /// Issue the platform route command for `target`
    fn apply_route(&self, target: &SwitchTarget) -> Result<()>;

    /// Register a callback for OS route broadcasts
    fn add_route_change_listener(&self, callback: ChangeCallback) -> Result<()>;
}

/// Where the host wants the picker anchored, in logical pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickerAnchor {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PickerAnchor {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            width: 44.0,
            height: 44.0,
        }
    }
}

/// Trait for the native output picker - the UI itself lives outside this crate
pub trait PickerInterface {
    /// Show `candidates` near `anchor`. `on_select` receives the chosen title.
    fn present(
        &self,
        anchor: PickerAnchor,
        candidates: Vec<OutputDevice>,
        on_select: SelectionCallback,
    ) -> Result<()>;
}

/// Trait for file system operations - abstracts std::fs for testability
pub trait FileSystemInterface {
    /// Read the entire contents of a configuration file
    fn read_config_file(&self, path: &Path) -> Result<String>;

    /// Write configuration content to a file
    fn write_config_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Check if a configuration file exists
    fn config_file_exists(&self, path: &Path) -> bool;

    /// Create the directory structure for config files
    fn create_config_dir(&self, path: &Path) -> Result<()>;
}
