// Persistence helpers for the bridge's key-value record
// The record lives at $STATE_DIR/state.json and is rewritten under an exclusive lock

use crate::config::Config;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Key holding the display name of the most recently resolved directory
pub const LAST_DIRECTORY_KEY: &str = "last_directory_name";

/// Key-value record persisted to disk
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateRecord {
    #[serde(flatten)]
    pub entries: BTreeMap<String, String>,
}

impl StateRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// Handle to the on-disk record
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(config: &Config) -> Self {
        Self::at(config.state_file())
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, treating a missing or empty file as empty
    pub fn load(&self) -> Result<StateRecord> {
        if !self.path.exists() {
            return Ok(StateRecord::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;

        if contents.trim().is_empty() {
            return Ok(StateRecord::default());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))
    }

    /// Read one key; unreadable state reads as absent
    pub fn get(&self, key: &str) -> Option<String> {
        self.load().ok()?.get(key).map(str::to_string)
    }

    /// Set one key, holding an exclusive lock across the read-modify-write
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let parent = self
            .path
            .parent()
            .with_context(|| format!("Invalid path: {}", self.path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;

        let lock_path = self.path.with_extension("json.lock");
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        // Acquire exclusive lock (blocking)
        lock.lock_exclusive()
            .with_context(|| "Failed to acquire exclusive lock on state file")?;

        let mut record = self.load().unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable state record: {:#}", e);
            StateRecord::default()
        });
        record.entries.insert(key.to_string(), value.to_string());

        let contents =
            serde_json::to_string_pretty(&record).with_context(|| "Failed to serialize state")?;
        atomic_write(&self.path, &contents)?;

        // Lock is released when `lock` is dropped
        Ok(())
    }
}

/// Atomically save data to a file using write-to-temp + rename
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Invalid path: {}", path.display()))?;

    // Temp file in the same directory so the rename stays on one filesystem
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown"),
        std::process::id()
    ));

    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
