// Clipboard access for the foreground context

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ClipboardError;

#[async_trait]
pub trait ClipboardSource: Send + Sync + 'static {
    /// Current clipboard text; an empty or non-text clipboard reads as ""
    async fn read_text(&self) -> Result<String, ClipboardError>;
}

/// The operating system clipboard
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

#[async_trait]
impl ClipboardSource for SystemClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        tokio::task::spawn_blocking(|| {
            match arboard::Clipboard::new().and_then(|mut cb| cb.get_text()) {
                Ok(text) => Ok(text),
                Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
                Err(e) => Err(ClipboardError(e.to_string())),
            }
        })
        .await
        .map_err(|e| ClipboardError(e.to_string()))?
    }
}

/// In-memory clipboard, used when no system clipboard is reachable
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    text: Mutex<String>,
}

impl MemoryClipboard {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
        }
    }

    pub fn set(&self, text: impl Into<String>) {
        *self.text.lock().unwrap() = text.into();
    }
}

#[async_trait]
impl ClipboardSource for MemoryClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        Ok(self.text.lock().unwrap().clone())
    }
}
