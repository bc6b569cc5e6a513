use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::route::{ChangeSource, OutputDevice, RawSnapshot, SwitchTarget};
use crate::system::adapters::apply_flag_model;
use crate::system::traits::{
    AudioRouteInterface, ChangeCallback, FileSystemInterface, PickerAnchor, PickerInterface,
    SelectionCallback,
};

/// Mock audio route for testing - provides controllable routing behavior
#[derive(Clone)]
pub struct MockAudioRoute {
    pub snapshot: Arc<Mutex<RawSnapshot>>,
    pub scripted_reads: Arc<Mutex<VecDeque<RawSnapshot>>>,
    pub apply_calls: Arc<Mutex<Vec<SwitchTarget>>>,
    pub listeners: Arc<Mutex<Vec<ChangeCallback>>>,
    pub read_count: Arc<AtomicUsize>,
    pub should_fail_read: Arc<AtomicBool>,
    pub apply_failure: Arc<Mutex<Option<String>>>,
    pub ignore_commands: Arc<AtomicBool>,
}

impl MockAudioRoute {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(RawSnapshot::default())),
            scripted_reads: Arc::new(Mutex::new(VecDeque::new())),
            apply_calls: Arc::new(Mutex::new(Vec::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            read_count: Arc::new(AtomicUsize::new(0)),
            should_fail_read: Arc::new(AtomicBool::new(false)),
            apply_failure: Arc::new(Mutex::new(None)),
            ignore_commands: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_snapshot(snapshot: RawSnapshot) -> Self {
        let mock = Self::new();
        mock.set_snapshot(snapshot);
        mock
    }

    /// Replace the persistent OS state
    pub fn set_snapshot(&self, snapshot: RawSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn current_snapshot(&self) -> RawSnapshot {
        self.snapshot.lock().unwrap().clone()
    }

    /// Queue a snapshot returned by the next read, ahead of the persistent state
    pub fn push_read(&self, snapshot: RawSnapshot) {
        self.scripted_reads.lock().unwrap().push_back(snapshot);
    }

    /// Fire every registered route-change listener
    pub fn trigger_route_change(&self, source: ChangeSource) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener(source);
        }
    }

    /// Get all route commands that were issued
    pub fn get_apply_calls(&self) -> Vec<SwitchTarget> {
        self.apply_calls.lock().unwrap().clone()
    }

    pub fn get_read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Configure the mock to fail snapshot reads
    pub fn set_read_failure(&self, should_fail: bool) {
        self.should_fail_read.store(should_fail, Ordering::SeqCst);
    }

    /// Configure the mock to fail route commands with `reason`
    pub fn set_apply_failure(&self, reason: Option<&str>) {
        *self.apply_failure.lock().unwrap() = reason.map(str::to_string);
    }

    /// Accept route commands without changing the reported state
    pub fn set_ignore_commands(&self, ignore: bool) {
        self.ignore_commands.store(ignore, Ordering::SeqCst);
    }

    /// Get count of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

impl AudioRouteInterface for MockAudioRoute {
    fn read_snapshot(&self) -> Result<RawSnapshot> {
        self.read_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail_read.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Mock read failure"));
        }

        if let Some(scripted) = self.scripted_reads.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    fn apply_route(&self, target: &SwitchTarget) -> Result<()> {
        if let Some(reason) = self.apply_failure.lock().unwrap().clone() {
            return Err(anyhow::anyhow!("{}", reason));
        }

        self.apply_calls.lock().unwrap().push(target.clone());

        if !self.ignore_commands.load(Ordering::SeqCst) {
            apply_flag_model(&mut self.snapshot.lock().unwrap(), target)?;
        }
        Ok(())
    }

    fn add_route_change_listener(&self, callback: ChangeCallback) -> Result<()> {
        self.listeners.lock().unwrap().push(callback);
        Ok(())
    }
}

impl Default for MockAudioRoute {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock picker for testing - records presentations and keeps the last
/// selection callback so tests can pick an entry
#[derive(Clone, Default)]
pub struct MockPicker {
    pub presentations: Arc<Mutex<Vec<(PickerAnchor, Vec<OutputDevice>)>>>,
    pub pending_selection: Arc<Mutex<Option<SelectionCallback>>>,
    pub should_fail: Arc<AtomicBool>,
}

impl MockPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_presentations(&self) -> Vec<(PickerAnchor, Vec<OutputDevice>)> {
        self.presentations.lock().unwrap().clone()
    }

    /// Simulate the user tapping `title`. Returns false if nothing was shown.
    pub fn select(&self, title: &str) -> bool {
        match self.pending_selection.lock().unwrap().take() {
            Some(callback) => {
                callback(title.to_string());
                true
            }
            None => false,
        }
    }

    pub fn set_failure(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }
}

impl PickerInterface for MockPicker {
    fn present(
        &self,
        anchor: PickerAnchor,
        candidates: Vec<OutputDevice>,
        on_select: SelectionCallback,
    ) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Mock picker failure"));
        }
        self.presentations.lock().unwrap().push((anchor, candidates));
        *self.pending_selection.lock().unwrap() = Some(on_select);
        Ok(())
    }
}

/// Mock file system for testing - provides controllable file operations
#[derive(Clone)]
pub struct MockFileSystem {
    pub files: Arc<Mutex<HashMap<PathBuf, String>>>,
    pub read_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub write_calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
    pub directory_creation_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub should_fail_read: Arc<Mutex<bool>>,
    pub should_fail_write: Arc<Mutex<bool>>,
    pub should_fail_create_dir: Arc<Mutex<bool>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            read_calls: Arc::new(Mutex::new(Vec::new())),
            write_calls: Arc::new(Mutex::new(Vec::new())),
            directory_creation_calls: Arc::new(Mutex::new(Vec::new())),
            should_fail_read: Arc::new(Mutex::new(false)),
            should_fail_write: Arc::new(Mutex::new(false)),
            should_fail_create_dir: Arc::new(Mutex::new(false)),
        }
    }

    /// Add a file to the mock file system
    pub fn add_file<P: AsRef<Path>>(&self, path: P, content: String) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), content);
    }

    /// Get all read calls that were made
    pub fn get_read_calls(&self) -> Vec<PathBuf> {
        self.read_calls.lock().unwrap().clone()
    }

    /// Get all write calls that were made
    pub fn get_write_calls(&self) -> Vec<(PathBuf, String)> {
        self.write_calls.lock().unwrap().clone()
    }

    /// Get all directory creation calls that were made
    pub fn get_directory_creation_calls(&self) -> Vec<PathBuf> {
        self.directory_creation_calls.lock().unwrap().clone()
    }

    /// Configure the mock to fail read operations
    pub fn set_read_failure(&self, should_fail: bool) {
        *self.should_fail_read.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail write operations
    pub fn set_write_failure(&self, should_fail: bool) {
        *self.should_fail_write.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail directory creation
    pub fn set_create_dir_failure(&self, should_fail: bool) {
        *self.should_fail_create_dir.lock().unwrap() = should_fail;
    }

    /// Check if a file exists in the mock system
    pub fn file_exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.files.lock().unwrap().contains_key(path.as_ref())
    }
}

impl FileSystemInterface for MockFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        self.read_calls.lock().unwrap().push(path.to_path_buf());

        if *self.should_fail_read.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock read failure"));
        }

        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.to_string()));

        if *self.should_fail_write.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock write failure"));
        }

        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        self.directory_creation_calls
            .lock()
            .unwrap()
            .push(path.to_path_buf());

        if *self.should_fail_create_dir.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock create directory failure"));
        }

        Ok(())
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}
