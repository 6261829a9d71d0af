//! Coordinator context: routes foreground requests and owns the privileged context's lifecycle.

pub mod host;
pub mod readiness;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::BringUpError;
use crate::marker;
use crate::protocol::{
    Action, ActionMessage, ActionResponse, EnsureDirectoryPayload, LoadFilePayload,
    SaveFilePayload, WriteFilePayload,
};
use crate::transport::{MessageHandler, Transport};

pub use host::{ContextHost, CreateError, LocalContextHost};
pub use readiness::Readiness;

pub struct Coordinator {
    host: Arc<dyn ContextHost>,
    privileged: Box<dyn Transport>,
    readiness: Readiness,
}

impl Coordinator {
    pub fn new(
        host: Arc<dyn ContextHost>,
        privileged: impl Transport + 'static,
        config: &Config,
    ) -> Self {
        Self {
            host,
            privileged: Box::new(privileged),
            readiness: Readiness::new(config.ready_timeout, config.grace_timeout),
        }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub async fn ensure_privileged_context(&self) -> Result<(), BringUpError> {
        self.readiness.ensure(Arc::clone(&self.host)).await
    }

    /// Route one message; every outcome is a response, never an error
    pub async fn dispatch(&self, message: ActionMessage) -> ActionResponse {
        let Some(action) = message.kind() else {
            warn!(action = %message.action, "unknown action");
            return ActionResponse::unknown_action();
        };

        match action {
            Action::SaveFile => self.save_file(&message).await,
            Action::PickDirectory => self.ensure_directory(true).await,
            Action::OpenModal => self.ensure_directory(false).await,
            Action::LoadFile => load_file(&message),
            Action::CloseModal => ActionResponse::ok(),
            Action::PrivilegedReady => {
                self.readiness.signal_ready();
                ActionResponse::ok()
            }
            Action::Ping => ActionResponse::ok(),
            // Internal requests the coordinator sends, never accepts
            Action::EnsureDirectory | Action::WriteFile => {
                warn!(%action, "internal action sent to coordinator");
                ActionResponse::unknown_action()
            }
        }
    }

    async fn save_file(&self, message: &ActionMessage) -> ActionResponse {
        let payload: SaveFilePayload = match message.payload() {
            Ok(p) => p,
            Err(e) => return ActionResponse::failure(format!("invalid payload: {}", e)),
        };

        let Some(parsed) = marker::parse(&payload.content) else {
            debug!("SAVE_FILE content has no marker");
            return ActionResponse::failure("could not detect marker");
        };

        let ensured = self.ensure_directory(false).await;
        if !ensured.success {
            // Cancellation passes through untouched; no write is attempted
            return ensured;
        }

        info!("Saving {}", parsed.filepath);
        self.forward(ActionMessage::new(
            Action::WriteFile,
            WriteFilePayload {
                filepath: parsed.filepath,
                body: parsed.body,
            },
        ))
        .await
    }

    async fn ensure_directory(&self, repick: bool) -> ActionResponse {
        self.forward(ActionMessage::new(
            Action::EnsureDirectory,
            EnsureDirectoryPayload { repick },
        ))
        .await
    }

    async fn forward(&self, message: ActionMessage) -> ActionResponse {
        if let Err(e) = self.ensure_privileged_context().await {
            error!("Privileged context unavailable: {}", e);
            return ActionResponse::failure(e.to_string());
        }

        match self.privileged.send(message).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Forwarding to privileged context failed: {}", e);
                ActionResponse::failure(format!("communication error: {}", e))
            }
        }
    }
}

fn load_file(message: &ActionMessage) -> ActionResponse {
    let payload: LoadFilePayload = message.payload().unwrap_or_default();
    debug!(selected = ?payload.selected_text, "LOAD_FILE acknowledged");
    ActionResponse::ok()
}

#[async_trait]
impl MessageHandler for Coordinator {
    async fn handle(&self, message: ActionMessage) -> ActionResponse {
        self.dispatch(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::test_utils::ScriptedTransport;

    /// Privileged context that is always discoverable
    struct RunningHost;

    #[async_trait]
    impl ContextHost for RunningHost {
        async fn exists(&self) -> bool {
            true
        }

        async fn create(&self) -> Result<(), CreateError> {
            Err(CreateError::AlreadyExists)
        }
    }

    fn granting(message: &ActionMessage) -> Result<ActionResponse, TransportError> {
        Ok(match message.kind() {
            Some(Action::EnsureDirectory) => ActionResponse::directory("notes"),
            Some(Action::WriteFile) => {
                let payload: WriteFilePayload = message.payload().unwrap();
                ActionResponse::saved(payload.filepath)
            }
            _ => ActionResponse::unknown_action(),
        })
    }

    fn coordinator(privileged: &ScriptedTransport) -> Coordinator {
        let config = Config::with_state_dir("/unused");
        Coordinator::new(Arc::new(RunningHost), privileged.clone(), &config)
    }

    fn save(content: &str) -> ActionMessage {
        ActionMessage::new(
            Action::SaveFile,
            SaveFilePayload {
                content: content.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_unknown_action_is_a_response() {
        let privileged = ScriptedTransport::new(granting);
        let coordinator = coordinator(&privileged);

        let message = ActionMessage {
            action: "FORMAT_DISK".to_string(),
            payload: serde_json::json!({}),
            timestamp: 0,
        };
        assert_eq!(coordinator.dispatch(message).await, ActionResponse::unknown_action());
        assert!(privileged.actions().is_empty());
    }

    #[tokio::test]
    async fn test_save_without_marker_never_reaches_privileged_context() {
        let privileged = ScriptedTransport::new(granting);
        let coordinator = coordinator(&privileged);

        let response = coordinator.dispatch(save("hello world")).await;
        assert_eq!(response, ActionResponse::failure("could not detect marker"));
        assert!(privileged.actions().is_empty());
        assert!(!coordinator.readiness().is_ready());
    }

    #[tokio::test]
    async fn test_save_ensures_directory_then_writes() {
        let privileged = ScriptedTransport::new(granting);
        let coordinator = coordinator(&privileged);

        let response = coordinator
            .dispatch(save("// src/app.ts\nconsole.log(1)"))
            .await;
        assert_eq!(response, ActionResponse::saved("src/app.ts"));
        assert_eq!(privileged.actions(), vec!["ENSURE_DIRECTORY", "WRITE_FILE"]);

        let sent = privileged.sent();
        let write: WriteFilePayload = sent[1].payload().unwrap();
        assert_eq!(write.body, "console.log(1)");
    }

    #[tokio::test]
    async fn test_cancelled_directory_skips_write() {
        let privileged = ScriptedTransport::new(|message| {
            Ok(match message.kind() {
                Some(Action::EnsureDirectory) => ActionResponse::cancelled(),
                _ => ActionResponse::saved("should not happen"),
            })
        });
        let coordinator = coordinator(&privileged);

        let response = coordinator.dispatch(save("// a/b/c.txt\nx")).await;
        assert_eq!(response, ActionResponse::cancelled());
        assert_eq!(privileged.actions(), vec!["ENSURE_DIRECTORY"]);
    }

    #[tokio::test]
    async fn test_pick_directory_forces_repick() {
        let privileged = ScriptedTransport::new(granting);
        let coordinator = coordinator(&privileged);

        let response = coordinator
            .dispatch(ActionMessage::bare(Action::PickDirectory))
            .await;
        assert_eq!(response, ActionResponse::directory("notes"));

        let sent = privileged.sent();
        let payload: EnsureDirectoryPayload = sent[0].payload().unwrap();
        assert!(payload.repick);
    }

    #[tokio::test]
    async fn test_open_modal_does_not_repick() {
        let privileged = ScriptedTransport::new(granting);
        let coordinator = coordinator(&privileged);

        let response = coordinator.dispatch(ActionMessage::bare(Action::OpenModal)).await;
        assert_eq!(response.dir_name.as_deref(), Some("notes"));

        let sent = privileged.sent();
        let payload: EnsureDirectoryPayload = sent[0].payload().unwrap();
        assert!(!payload.repick);
    }

    #[tokio::test]
    async fn test_acknowledgement_only_actions() {
        let privileged = ScriptedTransport::new(granting);
        let coordinator = coordinator(&privileged);

        let close = coordinator.dispatch(ActionMessage::bare(Action::CloseModal)).await;
        let load = coordinator
            .dispatch(ActionMessage::new(
                Action::LoadFile,
                LoadFilePayload {
                    selected_text: Some("notes/todo.md".to_string()),
                },
            ))
            .await;

        assert!(close.success);
        assert!(load.success);
        assert!(privileged.actions().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_becomes_communication_error() {
        let privileged = ScriptedTransport::new(|_| Err(TransportError::Closed("privileged")));
        let coordinator = coordinator(&privileged);

        let response = coordinator.dispatch(ActionMessage::bare(Action::PickDirectory)).await;
        assert!(!response.success);
        assert!(response
            .error
            .unwrap()
            .starts_with("communication error: privileged context is unreachable"));
    }

    #[tokio::test]
    async fn test_internal_actions_are_rejected() {
        let privileged = ScriptedTransport::new(granting);
        let coordinator = coordinator(&privileged);

        let response = coordinator
            .dispatch(ActionMessage::new(
                Action::WriteFile,
                WriteFilePayload {
                    filepath: "a.txt".to_string(),
                    body: "x".to_string(),
                },
            ))
            .await;
        assert_eq!(response, ActionResponse::unknown_action());
        assert!(privileged.actions().is_empty());
    }

    #[tokio::test]
    async fn test_readiness_signal_is_recorded() {
        let privileged = ScriptedTransport::new(granting);
        let coordinator = coordinator(&privileged);

        let response = coordinator
            .dispatch(ActionMessage::bare(Action::PrivilegedReady))
            .await;
        assert!(response.success);
    }
}
