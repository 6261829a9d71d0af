// Wires the three contexts together inside one process
//
// Each context only ever sees transports to the others. The coordinator is
// served immediately; the privileged context is created lazily on first use.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::coordinator::{ContextHost, Coordinator, LocalContextHost};
use crate::persistence::StateStore;
use crate::privileged::{PrivilegedFileService, Storage};
use crate::transport::{channel, ChannelTransport};

const INBOX_CAPACITY: usize = 64;

pub struct Bridge {
    coordinator: Arc<Coordinator>,
    host: Arc<dyn ContextHost>,
    to_coordinator: ChannelTransport,
    serving: JoinHandle<()>,
}

impl Bridge {
    /// Must be called from within a tokio runtime
    pub fn start<S: Storage>(config: &Config, storage: S, state: Option<StateStore>) -> Self {
        let (to_coordinator, coordinator_inbox) = channel("coordinator", INBOX_CAPACITY);
        let (to_privileged, privileged_inbox) = channel("privileged", INBOX_CAPACITY);

        let mut service = PrivilegedFileService::new(storage);
        if let Some(state) = state {
            service = service.with_state(state);
        }
        let host: Arc<dyn ContextHost> = Arc::new(LocalContextHost::new(
            service,
            privileged_inbox,
            to_coordinator.clone(),
        ));

        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&host),
            to_privileged.with_timeout(config.request_timeout),
            config,
        ));
        let serving = coordinator_inbox.serve(Arc::clone(&coordinator));
        info!("Bridge started");

        Self {
            coordinator,
            host,
            to_coordinator,
            serving,
        }
    }

    /// Transport the foreground uses to reach the coordinator
    pub fn coordinator_transport(&self) -> ChannelTransport {
        self.to_coordinator.clone()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn shutdown(self) {
        self.serving.abort();
        self.host.shutdown();
        info!("Bridge stopped");
    }
}
