// Privileged file service: the message handler run inside the privileged context

use async_trait::async_trait;
use tracing::{debug, warn};

use super::storage::Storage;
use super::store::DirectoryStore;
use crate::error::StoreError;
use crate::persistence::{StateStore, LAST_DIRECTORY_KEY};
use crate::protocol::{
    Action, ActionMessage, ActionResponse, EnsureDirectoryPayload, WriteFilePayload,
};
use crate::transport::MessageHandler;

pub struct PrivilegedFileService<S: Storage> {
    store: DirectoryStore<S>,
    state: Option<StateStore>,
}

impl<S: Storage> PrivilegedFileService<S> {
    pub fn new(storage: S) -> Self {
        Self {
            store: DirectoryStore::new(storage),
            state: None,
        }
    }

    /// Record the last resolved directory name in `state`
    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = Some(state);
        self
    }

    pub fn store(&self) -> &DirectoryStore<S> {
        &self.store
    }

    pub async fn ensure_directory(&self, repick: bool) -> ActionResponse {
        match self.store.ensure_directory(repick).await {
            Ok(dir_name) => {
                self.remember(&dir_name).await;
                ActionResponse::directory(dir_name)
            }
            Err(e) => store_failure(e),
        }
    }

    pub async fn save_file(&self, filepath: &str, body: &str) -> ActionResponse {
        // Resolve first so a dismissed prompt never leaves directories behind
        let dir_name = match self.store.ensure_directory(false).await {
            Ok(name) => name,
            Err(e) => return store_failure(e),
        };
        self.remember(&dir_name).await;

        match self.store.save_file(filepath, body).await {
            Ok(()) => ActionResponse::saved(filepath),
            Err(e) => store_failure(e),
        }
    }

    async fn remember(&self, dir_name: &str) {
        let Some(state) = self.state.clone() else {
            return;
        };
        let name = dir_name.to_string();
        let result =
            tokio::task::spawn_blocking(move || state.set(LAST_DIRECTORY_KEY, &name)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to persist last directory: {:#}", e),
            Err(e) => warn!("Persist task failed: {}", e),
        }
    }
}

fn store_failure(err: StoreError) -> ActionResponse {
    if err.is_cancelled() {
        debug!("Directory selection cancelled");
        ActionResponse::cancelled()
    } else {
        warn!("Storage failure: {}", err);
        ActionResponse::failure(err.to_string())
    }
}

#[async_trait]
impl<S: Storage> MessageHandler for PrivilegedFileService<S> {
    async fn handle(&self, message: ActionMessage) -> ActionResponse {
        match message.kind() {
            Some(Action::EnsureDirectory) => match message.payload::<EnsureDirectoryPayload>() {
                Ok(payload) => self.ensure_directory(payload.repick).await,
                Err(e) => ActionResponse::failure(format!("invalid payload: {}", e)),
            },
            Some(Action::WriteFile) => match message.payload::<WriteFilePayload>() {
                Ok(payload) => self.save_file(&payload.filepath, &payload.body).await,
                Err(e) => ActionResponse::failure(format!("invalid payload: {}", e)),
            },
            Some(Action::Ping) => ActionResponse::ok(),
            _ => {
                debug!(action = %message.action, "privileged context ignoring action");
                ActionResponse::unknown_action()
            }
        }
    }
}
