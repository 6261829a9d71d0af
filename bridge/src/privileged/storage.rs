// Storage primitive used by the privileged context
//
// Mirrors a directory-handle API: pick a directory, check its permission,
// resolve children one segment at a time, and write a whole file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::picker::DirectoryPicker;
use crate::error::StorageError;

/// Result of re-validating a cached directory handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    NeedsReprompt,
}

#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Opaque directory capability
    type Handle: Clone + Send + Sync + 'static;

    /// Interactive selection; `Ok(None)` when the user cancels
    async fn pick_directory(&self) -> Result<Option<Self::Handle>, StorageError>;

    async fn check_permission(&self, handle: &Self::Handle) -> Permission;

    async fn resolve_child(
        &self,
        parent: &Self::Handle,
        name: &str,
        create_if_missing: bool,
    ) -> Result<Self::Handle, StorageError>;

    /// Create or replace `name` inside `dir` with exactly `bytes`
    async fn write_file(
        &self,
        dir: &Self::Handle,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError>;

    /// Label shown to the user; never the full path
    fn display_name(&self, handle: &Self::Handle) -> String;
}

/// Local filesystem storage; handles are directory paths
pub struct LocalStorage<P> {
    picker: P,
}

impl<P: DirectoryPicker> LocalStorage<P> {
    pub fn new(picker: P) -> Self {
        Self { picker }
    }
}

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fixed-length sibling name for temp files and write checks
fn scratch_name() -> String {
    format!(
        ".mb.{}.{}",
        std::process::id(),
        SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Mode bits alone miss ownership and ACLs, so create and remove a real entry
async fn is_writable(dir: &Path) -> bool {
    let scratch = dir.join(scratch_name());
    let created = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&scratch)
        .await;
    match created {
        Ok(file) => {
            drop(file);
            if let Err(e) = tokio::fs::remove_file(&scratch).await {
                debug!("Failed to remove write check {}: {}", scratch.display(), e);
            }
            true
        }
        Err(e) => {
            debug!("Directory {} not writable: {}", dir.display(), e);
            false
        }
    }
}

/// Reject names that would escape the handle or address more than one level
fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(&['/', '\\', '\0'][..])
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl<P: DirectoryPicker> Storage for LocalStorage<P> {
    type Handle = PathBuf;

    async fn pick_directory(&self) -> Result<Option<PathBuf>, StorageError> {
        let Some(path) = self.picker.pick().await? else {
            return Ok(None);
        };

        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory(path.display().to_string()));
        }
        if !is_writable(&path).await {
            return Err(StorageError::NotWritable(path.display().to_string()));
        }
        Ok(Some(path))
    }

    async fn check_permission(&self, handle: &PathBuf) -> Permission {
        let is_dir = match tokio::fs::metadata(handle).await {
            Ok(metadata) => metadata.is_dir(),
            Err(e) => {
                debug!("Cached directory {} unusable: {}", handle.display(), e);
                false
            }
        };
        if is_dir && is_writable(handle).await {
            Permission::Granted
        } else {
            Permission::NeedsReprompt
        }
    }

    async fn resolve_child(
        &self,
        parent: &PathBuf,
        name: &str,
        create_if_missing: bool,
    ) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        let child = parent.join(name);

        match tokio::fs::metadata(&child).await {
            Ok(metadata) if metadata.is_dir() => Ok(child),
            Ok(_) => Err(StorageError::NotADirectory(child.display().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound && create_if_missing => {
                match tokio::fs::create_dir(&child).await {
                    Ok(()) => {
                        debug!("Created directory {}", child.display());
                        Ok(child)
                    }
                    // Lost a creation race; reuse whatever directory won
                    Err(e) if e.kind() == ErrorKind::AlreadyExists && child.is_dir() => Ok(child),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, dir: &PathBuf, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_name(name)?;
        let target = dir.join(name);
        if target.is_dir() {
            return Err(StorageError::NotADirectory(format!(
                "{} is a directory, not a file",
                target.display()
            )));
        }

        // Whole-file replace: write a sibling temp file, then rename over the target
        let temp = dir.join(scratch_name());
        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn display_name(&self, handle: &PathBuf) -> String {
        handle
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| handle.display().to_string())
    }
}
