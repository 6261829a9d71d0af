// Lifecycle of the privileged context as seen from the coordinator

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::privileged::{PrivilegedFileService, Storage};
use crate::protocol::{Action, ActionMessage};
use crate::transport::{ChannelTransport, Inbox, Transport};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
    /// Only one privileged context may exist and one already does
    #[error("privileged context already exists")]
    AlreadyExists,

    #[error("{0}")]
    Failed(String),
}

/// Creates and discovers the privileged context
#[async_trait]
pub trait ContextHost: Send + Sync + 'static {
    /// Discovery query: is a privileged context already running?
    async fn exists(&self) -> bool;

    /// Request creation; readiness is signalled separately by the new context
    async fn create(&self) -> Result<(), CreateError>;

    /// Tear the context down at bridge shutdown
    fn shutdown(&self) {}
}

enum Slot<S: Storage> {
    Dormant {
        service: PrivilegedFileService<S>,
        inbox: Inbox,
    },
    Running(JoinHandle<()>),
}

/// Hosts the privileged context as a task in this process
pub struct LocalContextHost<S: Storage> {
    slot: Mutex<Option<Slot<S>>>,
    coordinator: ChannelTransport,
}

impl<S: Storage> LocalContextHost<S> {
    /// `inbox` is where the privileged context will receive requests once
    /// created; `coordinator` carries its readiness signal back.
    pub fn new(
        service: PrivilegedFileService<S>,
        inbox: Inbox,
        coordinator: ChannelTransport,
    ) -> Self {
        Self {
            slot: Mutex::new(Some(Slot::Dormant { service, inbox })),
            coordinator,
        }
    }
}

#[async_trait]
impl<S: Storage> ContextHost for LocalContextHost<S> {
    async fn exists(&self) -> bool {
        matches!(
            self.slot.lock().unwrap().as_ref(),
            Some(Slot::Running(task)) if !task.is_finished()
        )
    }

    async fn create(&self) -> Result<(), CreateError> {
        let mut slot = self.slot.lock().unwrap();
        match slot.take() {
            Some(Slot::Dormant { service, inbox }) => {
                info!("Creating privileged context");
                let task = inbox.serve(Arc::new(service));
                *slot = Some(Slot::Running(task));
                drop(slot);

                // The context announces itself once it is serving
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move {
                    match coordinator
                        .send(ActionMessage::bare(Action::PrivilegedReady))
                        .await
                    {
                        Ok(_) => debug!("Readiness signal delivered"),
                        Err(e) => warn!("Failed to deliver readiness signal: {}", e),
                    }
                });
                Ok(())
            }
            Some(Slot::Running(task)) => {
                let finished = task.is_finished();
                *slot = Some(Slot::Running(task));
                if finished {
                    Err(CreateError::Failed(
                        "privileged context terminated".to_string(),
                    ))
                } else {
                    Err(CreateError::AlreadyExists)
                }
            }
            None => Err(CreateError::Failed(
                "privileged context unavailable".to_string(),
            )),
        }
    }

    fn shutdown(&self) {
        if let Some(Slot::Running(task)) = self.slot.lock().unwrap().as_ref() {
            debug!("Stopping privileged context");
            task.abort();
        }
    }
}
