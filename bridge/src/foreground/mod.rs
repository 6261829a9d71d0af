//! Foreground context: input capture and user-visible feedback.

pub mod capture;
pub mod clipboard;
pub mod feedback;
pub mod keys;

use crate::protocol::ActionResponse;

pub use capture::{CaptureAgent, CaptureEvent};
pub use clipboard::{ClipboardSource, MemoryClipboard, SystemClipboard};
pub use feedback::{BannerManager, BannerSurface, Feedback, TerminalSurface};
pub use keys::{Command, Key, KeyInput, KeyOutcome, KeyTarget, ModalController, ModalState};

/// One-line summary of a SAVE_FILE outcome
pub fn describe_save(result: Result<ActionResponse, String>) -> String {
    match result {
        Ok(response) if response.success => format!(
            "Saved: {}",
            response.filepath.as_deref().unwrap_or("file")
        ),
        Ok(response) if response.is_cancelled() => "Save cancelled".to_string(),
        Ok(response) => format!(
            "Save failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        ),
        Err(e) => format!("Save failed: {}", e),
    }
}
