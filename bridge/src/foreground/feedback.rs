//! User-visible feedback for the foreground context.
//!
//! A banner shows one short message at a time. A new message replaces the
//! current one, and a banner disappears on its own after a fixed duration.
//! The terminal surface also emits desktop-notification escape codes
//! (OSC 9, OSC 777) for terminals that support them.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// `show(message)`: fire-and-forget feedback
pub trait Feedback: Send + Sync {
    fn show(&self, message: &str);
}

/// Where a banner is drawn
pub trait BannerSurface: Send + Sync + 'static {
    fn render(&self, message: &str);
    fn clear(&self);
}

#[derive(Default)]
struct BannerState {
    generation: u64,
    current: Option<String>,
    dismiss: Option<JoinHandle<()>>,
}

/// Keeps at most one visible banner and dismisses it after `duration`
pub struct BannerManager<S: BannerSurface> {
    surface: Arc<S>,
    duration: Duration,
    state: Arc<Mutex<BannerState>>,
}

impl<S: BannerSurface> BannerManager<S> {
    pub fn new(surface: S, duration: Duration) -> Self {
        Self {
            surface: Arc::new(surface),
            duration,
            state: Arc::default(),
        }
    }

    /// Message currently on screen
    pub fn current(&self) -> Option<String> {
        self.state.lock().unwrap().current.clone()
    }
}

impl<S: BannerSurface> Feedback for BannerManager<S> {
    fn show(&self, message: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(previous) = state.dismiss.take() {
            previous.abort();
        }
        state.generation += 1;
        state.current = Some(message.to_string());
        self.surface.render(message);
        debug!(banner = message, "show");

        // Without a runtime the banner simply stays until replaced
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let generation = state.generation;
        let duration = self.duration;
        let shared = Arc::clone(&self.state);
        let surface = Arc::clone(&self.surface);
        state.dismiss = Some(runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            let mut state = shared.lock().unwrap();
            // A newer banner owns the surface now
            if state.generation == generation {
                state.current = None;
                state.dismiss = None;
                surface.clear();
            }
        }));
    }
}

/// Banner on a single stderr status line
#[derive(Debug, Clone, Default)]
pub struct TerminalSurface {
    desktop_notifications: bool,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also raise a desktop notification for every banner
    pub fn with_desktop_notifications(mut self, enabled: bool) -> Self {
        self.desktop_notifications = enabled;
        self
    }
}

impl BannerSurface for TerminalSurface {
    fn render(&self, message: &str) {
        let line = truncate_line(message, 120);
        let mut stderr = io::stderr();
        // \r + erase-line keeps the banner on one row even in raw mode
        let _ = write!(stderr, "\r\x1b[2K[marker-bridge] {}", line);
        if self.desktop_notifications {
            emit_desktop_notification(&mut stderr, "marker-bridge", &line);
        }
        let _ = stderr.flush();
    }

    fn clear(&self) {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "\r\x1b[2K");
        let _ = stderr.flush();
    }
}

/// OSC 9 (iTerm2) and OSC 777 (VTE/Konsole) notifications
fn emit_desktop_notification(out: &mut impl Write, title: &str, message: &str) {
    let _ = write!(out, "\x1b]9;{}\x07", escape_osc(message));
    let _ = write!(
        out,
        "\x1b]777;notify;{};{}\x07",
        escape_osc(title),
        escape_osc(message)
    );
}

/// OSC sequences end at BEL or ESC; strip both along with line breaks
fn escape_osc(s: &str) -> String {
    s.replace(&['\x07', '\x1b', '\r'][..], "").replace('\n', " ")
}

/// First line only, shortened to `max_chars` characters
fn truncate_line(message: &str, max_chars: usize) -> String {
    let first_line = message.lines().next().unwrap_or(message);
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let kept: String = first_line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
