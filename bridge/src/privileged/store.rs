// Directory store: the privileged context's single cached directory handle

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::storage::{Permission, Storage};
use crate::error::StoreError;

/// Owns at most one directory handle and re-validates it on every use
pub struct DirectoryStore<S: Storage> {
    storage: S,
    // Held across the picker so concurrent resolutions prompt at most once
    cached: Mutex<Option<S::Handle>>,
}

impl<S: Storage> DirectoryStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            cached: Mutex::new(None),
        }
    }

    pub async fn has_directory(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    /// Resolve the target directory and return its display name
    ///
    /// A cached handle whose permission is still granted is reused without
    /// prompting unless `repick` is set. A stale handle is dropped and
    /// replaced by a fresh pick.
    pub async fn ensure_directory(&self, repick: bool) -> Result<String, StoreError> {
        let handle = self.resolve(repick).await?;
        Ok(self.storage.display_name(&handle))
    }

    /// Write `body` to `path` relative to the target directory
    ///
    /// Intermediate segments are created when missing and reused when present.
    /// A failure partway through leaves already-created segments in place.
    pub async fn save_file(&self, path: &str, body: &str) -> Result<(), StoreError> {
        let segments = split_segments(path);
        let Some((file_name, parents)) = segments.split_last() else {
            return Err(StoreError::EmptyPath);
        };

        let mut dir = self.resolve(false).await?;
        for segment in parents {
            dir = self.storage.resolve_child(&dir, segment, true).await?;
        }
        self.storage
            .write_file(&dir, file_name, body.as_bytes())
            .await?;

        info!("Saved {} ({} bytes)", path, body.len());
        Ok(())
    }

    async fn resolve(&self, repick: bool) -> Result<S::Handle, StoreError> {
        let mut cached = self.cached.lock().await;

        if !repick {
            if let Some(handle) = cached.as_ref() {
                match self.storage.check_permission(handle).await {
                    Permission::Granted => return Ok(handle.clone()),
                    Permission::NeedsReprompt => {
                        info!("Cached directory no longer accessible, prompting again");
                        *cached = None;
                    }
                }
            }
        }

        match self.storage.pick_directory().await? {
            Some(handle) => {
                debug!("Directory resolved: {}", self.storage.display_name(&handle));
                *cached = Some(handle.clone());
                Ok(handle)
            }
            // A dismissed re-pick keeps the previous directory
            None => Err(StoreError::Cancelled),
        }
    }
}

/// Split a marker path into directory and file segments
///
/// Both separator styles are accepted. Empty and `.` segments are dropped.
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split(&['/', '\\'][..])
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}
