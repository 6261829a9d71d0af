// Environment configuration for the bridge
// Handles the state directory, the optional fixed target root, and protocol timeouts

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wait for the privileged context's readiness signal after creating it
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
/// Grace wait when creation reports the context already exists
pub const DEFAULT_GRACE_TIMEOUT: Duration = Duration::from_secs(3);
/// Bound on one forwarded request/response round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a feedback banner stays visible
pub const DEFAULT_BANNER_DURATION: Duration = Duration::from_secs(4);
/// Clipboard polling interval for the capture agent
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for bridge paths and settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for persistent state (state.json)
    pub state_dir: PathBuf,
    /// Fixed target directory; when set, directory selection never prompts
    pub target_root: Option<PathBuf>,
    /// Suspend key handling while the host window is unfocused
    pub focus_only: bool,
    pub ready_timeout: Duration,
    pub grace_timeout: Duration,
    pub request_timeout: Duration,
    pub banner_duration: Duration,
    pub poll_interval: Duration,
}

impl Config {
    /// Create configuration using default paths and timeouts
    pub fn default_paths() -> Self {
        Self::with_state_dir(Self::default_state_dir())
    }

    /// Defaults rooted at an explicit state directory
    pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            target_root: None,
            focus_only: true,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            grace_timeout: DEFAULT_GRACE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            banner_duration: DEFAULT_BANNER_DURATION,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        // MARKER_BRIDGE_DIR overrides the state directory
        let mut config = match std::env::var("MARKER_BRIDGE_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::with_state_dir(dir),
            _ => Self::default_paths(),
        };

        if let Ok(root) = std::env::var("MARKER_BRIDGE_ROOT") {
            if !root.trim().is_empty() {
                config.target_root = Some(expand_home(root.trim()));
            }
        }

        if let Ok(flag) = std::env::var("MARKER_BRIDGE_FOCUS_ONLY") {
            config.focus_only = parse_flag(&flag).unwrap_or(true);
        }

        if let Some(d) = duration_from_env("MARKER_BRIDGE_READY_TIMEOUT_MS") {
            config.ready_timeout = d;
        }
        if let Some(d) = duration_from_env("MARKER_BRIDGE_GRACE_TIMEOUT_MS") {
            config.grace_timeout = d;
        }
        if let Some(d) = duration_from_env("MARKER_BRIDGE_REQUEST_TIMEOUT_MS") {
            config.request_timeout = d;
        }
        if let Some(d) = duration_from_env("MARKER_BRIDGE_BANNER_MS") {
            config.banner_duration = d;
        }
        if let Some(d) = duration_from_env("MARKER_BRIDGE_POLL_MS") {
            config.poll_interval = d;
        }

        config
    }

    /// Get the default state directory
    fn default_state_dir() -> PathBuf {
        // All platforms: ~/.marker-bridge/ (or /tmp/marker-bridge if home unavailable)
        dirs::home_dir()
            .map(|h| h.join(".marker-bridge"))
            .unwrap_or_else(|| PathBuf::from("/tmp/marker-bridge"))
    }

    /// Get the state directory
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Get the persisted key-value record path
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    /// Ensure the state directory exists with owner-only permissions
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.state_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }
}

fn duration_from_env(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand a leading `~/` against the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
