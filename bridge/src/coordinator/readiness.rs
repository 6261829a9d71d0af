// Single-flight bring-up of the privileged context
//
// `ready` only ever moves false -> true. While a bring-up is in flight every
// caller awaits the same shared future, so at most one creation is attempted
// and a failure reaches all of its waiters. The next caller after the last
// waiter has left starts a fresh attempt.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::host::{ContextHost, CreateError};
use crate::error::BringUpError;

type BringUp = Shared<BoxFuture<'static, Result<(), BringUpError>>>;

#[derive(Clone)]
pub struct Readiness {
    inner: Arc<Inner>,
}

struct InFlight {
    future: BringUp,
    waiters: usize,
}

struct Inner {
    ready: AtomicBool,
    signal: watch::Sender<bool>,
    // Cleared when its last waiter leaves, not when it completes
    pending: Mutex<Option<InFlight>>,
    attempts: AtomicUsize,
    ready_timeout: Duration,
    grace_timeout: Duration,
}

impl Readiness {
    pub fn new(ready_timeout: Duration, grace_timeout: Duration) -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                ready: AtomicBool::new(false),
                signal,
                pending: Mutex::new(None),
                attempts: AtomicUsize::new(0),
                ready_timeout,
                grace_timeout,
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Number of creation requests issued so far
    pub fn creation_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Record the readiness signal emitted by the privileged context
    pub fn signal_ready(&self) {
        debug!("Readiness signal received");
        self.inner.signal.send_replace(true);
    }

    /// Make sure the privileged context exists and has signalled readiness
    pub async fn ensure(&self, host: Arc<dyn ContextHost>) -> Result<(), BringUpError> {
        if self.is_ready() {
            return Ok(());
        }

        let waiter = {
            let mut pending = self.inner.pending.lock().unwrap();
            let future = match pending.as_mut() {
                Some(in_flight) => {
                    debug!("Joining in-flight bring-up");
                    in_flight.waiters += 1;
                    in_flight.future.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let future = async move {
                        // Let callers that are already runnable join before a
                        // non-suspending creation settles
                        tokio::task::yield_now().await;
                        inner.bring_up(host.as_ref()).await
                    }
                    .boxed()
                    .shared();
                    *pending = Some(InFlight {
                        future: future.clone(),
                        waiters: 1,
                    });
                    future
                }
            };
            Waiter {
                inner: &self.inner,
                future,
            }
        };

        waiter.future.clone().await
    }
}

/// One registered caller of an in-flight bring-up; leaving releases the marker
struct Waiter<'a> {
    inner: &'a Inner,
    future: BringUp,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut pending = self.inner.pending.lock().unwrap();
        if let Some(in_flight) = pending.as_mut() {
            if in_flight.future.ptr_eq(&self.future) {
                in_flight.waiters -= 1;
                if in_flight.waiters == 0 {
                    *pending = None;
                }
            }
        }
    }
}

impl Inner {
    async fn bring_up(&self, host: &dyn ContextHost) -> Result<(), BringUpError> {
        if self.ready.load(Ordering::SeqCst) {
            return Ok(());
        }

        if host.exists().await {
            info!("Privileged context already running");
            self.mark_ready();
            return Ok(());
        }

        // Subscribe before creating so an early signal is not missed
        let mut signal = self.signal.subscribe();
        self.attempts.fetch_add(1, Ordering::SeqCst);

        match host.create().await {
            Ok(()) => {
                if wait_for_signal(&mut signal, self.ready_timeout).await {
                    self.mark_ready();
                    Ok(())
                } else {
                    warn!(
                        "Privileged context did not signal readiness within {:?}",
                        self.ready_timeout
                    );
                    Err(BringUpError::ReadinessTimeout(self.ready_timeout))
                }
            }
            Err(CreateError::AlreadyExists) => {
                if !wait_for_signal(&mut signal, self.grace_timeout).await {
                    warn!(
                        "Privileged context exists but sent no readiness signal within {:?}, proceeding",
                        self.grace_timeout
                    );
                }
                self.mark_ready();
                Ok(())
            }
            Err(CreateError::Failed(msg)) => {
                warn!("Privileged context creation failed: {}", msg);
                Err(BringUpError::CreationFailed(msg))
            }
        }
    }

    fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            info!("Privileged context ready");
        }
    }
}

async fn wait_for_signal(signal: &mut watch::Receiver<bool>, limit: Duration) -> bool {
    matches!(
        tokio::time::timeout(limit, signal.wait_for(|ready| *ready)).await,
        Ok(Ok(_))
    )
}
