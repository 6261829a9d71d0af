// Modal key handling for the foreground context
//
// Idle: only the open combo (Ctrl+B) is a command, and keys aimed at an
// editable target pass through untouched.
// Listening: s / l / d / Escape are commands wherever focus is.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clipboard::ClipboardSource;
use super::feedback::Feedback;
use super::describe_save;
use crate::protocol::{Action, ActionMessage, ActionResponse, LoadFilePayload, SaveFilePayload};
use crate::transport::Transport;

pub const MODE_HINT: &str = "[S]ave | [L]oad | [D]irectory | [Esc]ape";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Other,
}

/// What had focus when the key was pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTarget {
    Page,
    /// Form control or other editable text
    Editable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub ctrl: bool,
    pub target: KeyTarget,
}

impl KeyInput {
    pub fn char(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: false,
            target: KeyTarget::Page,
        }
    }

    pub fn ctrl(c: char) -> Self {
        Self {
            ctrl: true,
            ..Self::char(c)
        }
    }

    pub fn escape() -> Self {
        Self {
            key: Key::Escape,
            ctrl: false,
            target: KeyTarget::Page,
        }
    }

    pub fn in_editable(mut self) -> Self {
        self.target = KeyTarget::Editable;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Idle,
    Listening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OpenModal,
    Save,
    Load,
    PickDirectory,
    CloseModal,
}

impl Command {
    fn from_key(input: &KeyInput, state: ModalState) -> Option<Command> {
        match input.key {
            Key::Char(c) if input.ctrl && c.eq_ignore_ascii_case(&'b') => Some(Command::OpenModal),
            _ if state == ModalState::Idle => None,
            Key::Char(c) => match c.to_ascii_lowercase() {
                's' => Some(Command::Save),
                'l' => Some(Command::Load),
                'd' => Some(Command::PickDirectory),
                _ => None,
            },
            Key::Escape => Some(Command::CloseModal),
            Key::Other => None,
        }
    }
}

/// Result of one key event
#[derive(Debug)]
pub struct KeyOutcome {
    /// The key was consumed and its default behaviour must be suppressed
    pub prevent_default: bool,
    pub command: Option<Command>,
    /// Completion of the dispatched request, if one was sent
    pub dispatch: Option<JoinHandle<()>>,
}

impl KeyOutcome {
    fn ignored() -> Self {
        Self {
            prevent_default: false,
            command: None,
            dispatch: None,
        }
    }

    /// Wait for the dispatched request and its feedback to finish
    pub async fn settled(self) {
        if let Some(task) = self.dispatch {
            if let Err(e) = task.await {
                warn!("Key dispatch task failed: {}", e);
            }
        }
    }
}

#[derive(Debug)]
struct ModalSession {
    state: ModalState,
    active_directory_name: Option<String>,
    // Bumped on close so a late OPEN_MODAL reply cannot reopen the session
    generation: u64,
    window_focused: bool,
    selection: Option<String>,
}

#[derive(Clone)]
pub struct ModalController {
    session: Arc<Mutex<ModalSession>>,
    coordinator: Arc<dyn Transport>,
    feedback: Arc<dyn Feedback>,
    clipboard: Arc<dyn ClipboardSource>,
    focus_only: bool,
}

impl ModalController {
    pub fn new(
        coordinator: Arc<dyn Transport>,
        feedback: Arc<dyn Feedback>,
        clipboard: Arc<dyn ClipboardSource>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(ModalSession {
                state: ModalState::Idle,
                active_directory_name: None,
                generation: 0,
                window_focused: true,
                selection: None,
            })),
            coordinator,
            feedback,
            clipboard,
            focus_only: true,
        }
    }

    /// Suspend all key handling while the window is unfocused
    pub fn with_focus_gate(mut self, enabled: bool) -> Self {
        self.focus_only = enabled;
        self
    }

    pub fn state(&self) -> ModalState {
        self.session.lock().unwrap().state
    }

    pub fn active_directory_name(&self) -> Option<String> {
        self.session.lock().unwrap().active_directory_name.clone()
    }

    pub fn set_window_focused(&self, focused: bool) {
        debug!(focused, "window focus changed");
        self.session.lock().unwrap().window_focused = focused;
    }

    /// Text sent with the next LOAD request
    pub fn set_selection(&self, selection: Option<String>) {
        self.session.lock().unwrap().selection = selection.filter(|s| !s.trim().is_empty());
    }

    /// Handle one key press; dispatches run on their own task
    pub fn on_key(&self, input: KeyInput) -> KeyOutcome {
        let mut session = self.session.lock().unwrap();

        if self.focus_only && !session.window_focused {
            return KeyOutcome::ignored();
        }
        if session.state == ModalState::Idle && input.target == KeyTarget::Editable {
            return KeyOutcome::ignored();
        }
        let Some(command) = Command::from_key(&input, session.state) else {
            return KeyOutcome::ignored();
        };
        debug!(?command, "key command");

        let dispatch = match command {
            Command::OpenModal => {
                let generation = session.generation;
                let this = self.clone();
                tokio::spawn(async move { this.open(generation).await })
            }
            Command::CloseModal => {
                // Optimistic: the session closes before the reply arrives
                session.state = ModalState::Idle;
                session.active_directory_name = None;
                session.generation += 1;
                self.feedback.show("Bridge mode closed");
                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.send(ActionMessage::bare(Action::CloseModal)).await {
                        debug!("CLOSE_MODAL not delivered: {}", e);
                    }
                })
            }
            Command::Save => {
                let this = self.clone();
                tokio::spawn(async move { this.save().await })
            }
            Command::Load => {
                let selected_text = session.selection.clone();
                let this = self.clone();
                tokio::spawn(async move { this.load(selected_text).await })
            }
            Command::PickDirectory => {
                let this = self.clone();
                tokio::spawn(async move { this.pick_directory().await })
            }
        };

        KeyOutcome {
            prevent_default: true,
            command: Some(command),
            dispatch: Some(dispatch),
        }
    }

    async fn send(&self, message: ActionMessage) -> Result<ActionResponse, String> {
        self.coordinator
            .send(message)
            .await
            .map_err(|e| e.to_string())
    }

    async fn open(&self, generation: u64) {
        let result = self.send(ActionMessage::bare(Action::OpenModal)).await;

        let message = {
            let mut session = self.session.lock().unwrap();
            if session.generation != generation {
                debug!("Ignoring OPEN_MODAL reply for a closed session");
                return;
            }
            match result {
                Ok(ActionResponse {
                    success: true,
                    dir_name: Some(dir_name),
                    ..
                }) => {
                    session.state = ModalState::Listening;
                    let message = format!("Bridge mode ({}): {}", dir_name, MODE_HINT);
                    session.active_directory_name = Some(dir_name);
                    message
                }
                other => {
                    session.state = ModalState::Idle;
                    session.active_directory_name = None;
                    match other {
                        Ok(response) if response.is_cancelled() => {
                            "Directory selection cancelled".to_string()
                        }
                        Ok(response) => format!(
                            "Failed to open bridge mode: {}",
                            response.error.as_deref().unwrap_or("no directory")
                        ),
                        Err(e) => format!("Failed to open bridge mode: {}", e),
                    }
                }
            }
        };
        self.feedback.show(&message);
    }

    async fn save(&self) {
        let content = match self.clipboard.read_text().await {
            Ok(content) => content,
            Err(e) => {
                warn!("{}", e);
                self.feedback.show("Failed to read clipboard");
                return;
            }
        };
        if content.trim().is_empty() {
            self.feedback.show("Clipboard is empty");
            return;
        }

        let result = self
            .send(ActionMessage::new(Action::SaveFile, SaveFilePayload { content }))
            .await;
        self.feedback.show(&describe_save(result));
    }

    async fn load(&self, selected_text: Option<String>) {
        let result = self
            .send(ActionMessage::new(Action::LoadFile, LoadFilePayload { selected_text }))
            .await;
        match result {
            Ok(response) if response.success => self.feedback.show("Load requested"),
            Ok(response) => self.feedback.show(&format!(
                "Load failed: {}",
                response.error.as_deref().unwrap_or("unknown error")
            )),
            Err(e) => self.feedback.show(&format!("Load failed: {}", e)),
        }
    }

    async fn pick_directory(&self) {
        let message = match self.send(ActionMessage::bare(Action::PickDirectory)).await {
            Ok(ActionResponse {
                success: true,
                dir_name: Some(dir_name),
                ..
            }) => {
                let mut session = self.session.lock().unwrap();
                if session.state == ModalState::Listening {
                    session.active_directory_name = Some(dir_name.clone());
                }
                format!("Directory: {}", dir_name)
            }
            Ok(response) if response.is_cancelled() => "Directory unchanged".to_string(),
            Ok(response) => format!(
                "Directory selection failed: {}",
                response.error.as_deref().unwrap_or("unknown error")
            ),
            Err(e) => format!("Directory selection failed: {}", e),
        };
        self.feedback.show(&message);
    }
}
