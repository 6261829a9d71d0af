// Shared fakes for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use marker_bridge_lib::config::Config;
use marker_bridge_lib::error::StorageError;
use marker_bridge_lib::privileged::DirectoryPicker;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Picker that replays scripted answers and counts how often it was asked
#[derive(Clone)]
pub struct ScriptedPicker {
    answers: Arc<Mutex<VecDeque<Option<PathBuf>>>>,
    prompts: Arc<AtomicUsize>,
    delay: Duration,
}

impl ScriptedPicker {
    pub fn answering(answers: Vec<Option<PathBuf>>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into())),
            prompts: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Keep the prompt open for `delay` so concurrent callers overlap with it
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryPicker for ScriptedPicker {
    async fn pick(&self) -> Result<Option<PathBuf>, StorageError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        // An exhausted script behaves like a dismissed prompt
        Ok(self.answers.lock().unwrap().pop_front().flatten())
    }
}

/// Config with short timeouts rooted in a scratch state directory
pub fn test_config(state_dir: &Path) -> Config {
    let mut config = Config::with_state_dir(state_dir);
    config.ready_timeout = Duration::from_secs(2);
    config.grace_timeout = Duration::from_millis(200);
    config.request_timeout = Duration::from_secs(5);
    config
}

/// Every file below `root`, as sorted `/`-separated relative paths
pub fn list_files(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

/// Feedback sink that keeps every banner
#[derive(Default)]
pub struct Banners(Mutex<Vec<String>>);

impl Banners {
    pub fn shown(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl marker_bridge_lib::foreground::Feedback for Banners {
    fn show(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}
