// Clipboard capture: saves marked text as soon as it is copied

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use super::clipboard::ClipboardSource;
use super::feedback::Feedback;
use super::keys::{Key, KeyInput};
use crate::marker;
use crate::protocol::{Action, ActionMessage, ActionResponse, SaveFilePayload};
use crate::transport::Transport;

/// Settle delay after a copy event
pub const COPY_SETTLE: Duration = Duration::from_millis(100);
/// Settle delay after any other interaction
pub const INTERACTION_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    Copy,
    Interaction,
}

impl CaptureEvent {
    /// Copy and cut shortcuts settle fast; any other key is a plain interaction
    pub fn from_key(input: &KeyInput) -> Self {
        match input.key {
            Key::Char(c) if input.ctrl && matches!(c.to_ascii_lowercase(), 'c' | 'x') => {
                CaptureEvent::Copy
            }
            _ => CaptureEvent::Interaction,
        }
    }

    pub fn settle(&self) -> Duration {
        match self {
            CaptureEvent::Copy => COPY_SETTLE,
            CaptureEvent::Interaction => INTERACTION_SETTLE,
        }
    }
}

pub struct CaptureAgent {
    coordinator: Arc<dyn Transport>,
    feedback: Arc<dyn Feedback>,
    clipboard: Arc<dyn ClipboardSource>,
    last_seen: Mutex<Option<String>>,
}

impl CaptureAgent {
    pub fn new(
        coordinator: Arc<dyn Transport>,
        feedback: Arc<dyn Feedback>,
        clipboard: Arc<dyn ClipboardSource>,
    ) -> Self {
        Self {
            coordinator,
            feedback,
            clipboard,
            last_seen: Mutex::new(None),
        }
    }

    /// Treat the current clipboard as already seen so it is not saved on start-up
    pub async fn prime(&self) {
        if let Ok(text) = self.clipboard.read_text().await {
            *self.last_seen.lock().unwrap() = Some(text);
        }
    }

    /// React to an input event once the clipboard has had time to settle
    pub async fn on_event(&self, event: CaptureEvent) -> Option<ActionResponse> {
        tokio::time::sleep(event.settle()).await;
        self.check().await
    }

    /// Save the clipboard if it changed and carries a marker
    ///
    /// Returns the save response, or `None` when nothing was dispatched.
    pub async fn check(&self) -> Option<ActionResponse> {
        let text = match self.clipboard.read_text().await {
            Ok(text) => text,
            Err(e) => {
                debug!("Clipboard read skipped: {}", e);
                return None;
            }
        };
        if text.is_empty() {
            return None;
        }

        {
            let mut last_seen = self.last_seen.lock().unwrap();
            if last_seen.as_deref() == Some(text.as_str()) {
                return None;
            }
            *last_seen = Some(text.clone());
        }

        // Ordinary copies carry no marker; stay quiet
        let parsed = marker::parse(&text)?;
        let name = parsed.file_name().to_string();
        info!("Detected marker for {}", parsed.filepath);
        self.feedback.show(&format!("Detected: {}", name));

        let response = match self
            .coordinator
            .send(ActionMessage::new(
                Action::SaveFile,
                SaveFilePayload { content: text },
            ))
            .await
        {
            Ok(response) => response,
            Err(e) => ActionResponse::failure(format!("communication error: {}", e)),
        };

        if response.success {
            self.feedback.show(&format!("Saved: {}", name));
        } else if response.is_cancelled() {
            self.feedback.show("Save cancelled");
        } else {
            debug!(error = ?response.error, "capture save failed");
            self.feedback.show("Save failed");
        }
        Some(response)
    }
}
