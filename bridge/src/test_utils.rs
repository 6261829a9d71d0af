//! Test utilities shared by the unit tests
//!
//! Polling assertions work under paused tokio time as well as real time.
//! The fakes stand in for the collaborators each context talks to: a
//! directory prompt, another context's transport, and the feedback banner.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{StorageError, TransportError};
use crate::foreground::Feedback;
use crate::privileged::DirectoryPicker;
use crate::protocol::{ActionMessage, ActionResponse};
use crate::transport::Transport;

/// Assert that an async condition eventually succeeds within a timeout.
///
/// `f` is retried every `interval`; `Ok(value)` ends the wait and returns the value.
///
/// ```rust,ignore
/// let name = assert_eventually(
///     "directory to be resolved",
///     Duration::from_secs(2),
///     Duration::from_millis(20),
///     || async { state.get(LAST_DIRECTORY_KEY).ok_or("not persisted yet") },
/// )
/// .await;
/// ```
pub async fn assert_eventually<F, Fut, T, E>(
    desc: &str,
    timeout: Duration,
    interval: Duration,
    mut f: F,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return value,
            Err(e) => {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    panic!(
                        "Timeout waiting for {}\n\
                         Duration: {:?}\n\
                         Attempts: {}\n\
                         Last error: {}",
                        desc, elapsed, attempt, e
                    );
                }

                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Boolean variant of `assert_eventually`
pub async fn assert_eventually_bool<F, Fut>(
    desc: &str,
    timeout: Duration,
    interval: Duration,
    mut f: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    assert_eventually(desc, timeout, interval, || {
        let fut = f();
        async move {
            if fut.await {
                Ok(())
            } else {
                Err("condition never became true")
            }
        }
    })
    .await
}

/// Directory picker that replays scripted answers and counts prompts
#[derive(Clone, Default)]
pub struct ScriptedPicker {
    answers: Arc<Mutex<VecDeque<Option<PathBuf>>>>,
    prompts: Arc<AtomicUsize>,
}

impl ScriptedPicker {
    /// `None` entries dismiss the prompt; an exhausted script also dismisses
    pub fn answering(answers: Vec<Option<PathBuf>>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into())),
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryPicker for ScriptedPicker {
    async fn pick(&self) -> Result<Option<PathBuf>, StorageError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.lock().unwrap().pop_front().flatten())
    }
}

pub type Reply = fn(&ActionMessage) -> Result<ActionResponse, TransportError>;

/// Transport that records every message and answers with `reply`
#[derive(Clone)]
pub struct ScriptedTransport {
    sent: Arc<Mutex<Vec<ActionMessage>>>,
    reply: Reply,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new(reply: Reply) -> Self {
        Self {
            sent: Arc::default(),
            reply,
            delay: None,
        }
    }

    /// Answer only after `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<ActionMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.action).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, message: ActionMessage) -> Result<ActionResponse, TransportError> {
        let reply = (self.reply)(&message);
        self.sent.lock().unwrap().push(message);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

/// Feedback that keeps every shown message
#[derive(Default)]
pub struct RecordingFeedback {
    shown: Mutex<Vec<String>>,
}

impl RecordingFeedback {
    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.shown.lock().unwrap().last().cloned()
    }
}

impl Feedback for RecordingFeedback {
    fn show(&self, message: &str) {
        self.shown.lock().unwrap().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_assert_eventually_succeeds_after_retries() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = assert_eventually(
            "counter to reach 3",
            Duration::from_secs(2),
            Duration::from_millis(20),
            move || {
                let c = Arc::clone(&counter_clone);
                async move {
                    let val = c.fetch_add(1, Ordering::SeqCst);
                    if val >= 2 {
                        Ok(val)
                    } else {
                        Err(format!("counter only at {}", val))
                    }
                }
            },
        )
        .await;

        assert!(result >= 2);
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "Timeout waiting for never true")]
    async fn test_assert_eventually_bool_times_out_under_paused_time() {
        assert_eventually_bool(
            "never true",
            Duration::from_secs(30),
            Duration::from_secs(1),
            || async { false },
        )
        .await;
    }

    #[tokio::test]
    async fn test_scripted_picker_replays_then_dismisses() {
        let picker = ScriptedPicker::answering(vec![Some(PathBuf::from("/a")), None]);
        assert_eq!(picker.pick().await.unwrap(), Some(PathBuf::from("/a")));
        assert_eq!(picker.pick().await.unwrap(), None);
        assert_eq!(picker.pick().await.unwrap(), None);
        assert_eq!(picker.prompts(), 3);
    }
}
