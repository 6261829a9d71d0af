// Directory pickers for the local storage primitive

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use tracing::{info, warn};

use crate::config::expand_home;
use crate::error::StorageError;

#[async_trait]
pub trait DirectoryPicker: Send + Sync + 'static {
    /// Ask for a directory; `Ok(None)` when the user dismisses the prompt
    async fn pick(&self) -> Result<Option<PathBuf>, StorageError>;
}

/// Non-interactive picker that always resolves to one configured directory
#[derive(Debug, Clone)]
pub struct FixedPicker {
    root: PathBuf,
}

impl FixedPicker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DirectoryPicker for FixedPicker {
    async fn pick(&self) -> Result<Option<PathBuf>, StorageError> {
        if tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            Ok(Some(self.root.clone()))
        } else {
            warn!(
                "Configured target root {} is not a directory",
                self.root.display()
            );
            Ok(None)
        }
    }
}

/// Shared flag that pauses terminal key reading while a prompt owns the terminal
#[derive(Debug, Clone, Default)]
pub struct InputGate(Arc<AtomicBool>);

impl InputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Paused until the returned guard is dropped
    pub fn pause(&self) -> GatePause {
        self.0.store(true, Ordering::SeqCst);
        GatePause(self.clone())
    }
}

#[derive(Debug)]
pub struct GatePause(InputGate);

impl Drop for GatePause {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::SeqCst);
    }
}

/// Prompts for a directory on the controlling terminal
#[derive(Debug, Clone)]
pub struct TerminalPicker {
    suggestion: Option<PathBuf>,
    gate: InputGate,
}

impl TerminalPicker {
    /// Suggests the downloads directory, like a browser picker's default start location
    pub fn new(gate: InputGate) -> Self {
        Self {
            suggestion: dirs::download_dir(),
            gate,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<PathBuf>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Whether a controlling terminal is available to answer the prompt
    pub fn has_terminal() -> bool {
        open_terminal().is_ok()
    }
}

#[async_trait]
impl DirectoryPicker for TerminalPicker {
    async fn pick(&self) -> Result<Option<PathBuf>, StorageError> {
        let suggestion = self.suggestion.clone();

        let pause = self.gate.pause();
        let answer = tokio::task::spawn_blocking(move || prompt_blocking(suggestion.as_deref()))
            .await
            .map_err(|e| StorageError::Picker(e.to_string()));
        drop(pause);

        let answer = answer??;
        match &answer {
            Some(path) => info!("Directory chosen: {}", path.display()),
            None => info!("Directory prompt dismissed"),
        }
        Ok(answer)
    }
}

fn prompt_blocking(suggestion: Option<&Path>) -> Result<Option<PathBuf>, StorageError> {
    // Line input needs cooked mode; restore whatever mode the caller had
    let was_raw = is_raw_mode_enabled().unwrap_or(false);
    if was_raw {
        disable_raw_mode().map_err(|e| StorageError::Picker(e.to_string()))?;
    }

    let result = read_answer(suggestion);

    if was_raw {
        enable_raw_mode().map_err(|e| StorageError::Picker(e.to_string()))?;
    }
    result
}

/// Answers come from the controlling terminal so piped stdin stays with the caller
fn open_terminal() -> io::Result<Box<dyn BufRead>> {
    #[cfg(windows)]
    let tty = File::open("CONIN$")?;
    #[cfg(not(windows))]
    let tty = File::open("/dev/tty")?;
    Ok(Box::new(BufReader::new(tty)))
}

fn read_answer(suggestion: Option<&Path>) -> Result<Option<PathBuf>, StorageError> {
    let mut terminal = open_terminal()
        .map_err(|e| StorageError::Picker(format!("no terminal for the prompt: {}", e)))?;
    read_answer_from(&mut terminal, &mut io::stderr(), suggestion)
}

fn read_answer_from(
    input: &mut dyn BufRead,
    prompt: &mut dyn Write,
    suggestion: Option<&Path>,
) -> Result<Option<PathBuf>, StorageError> {
    match suggestion {
        Some(s) => write!(
            prompt,
            "\r\nTarget directory (Enter to cancel, '.' for {}): ",
            s.display()
        )?,
        None => write!(prompt, "\r\nTarget directory (Enter to cancel): ")?,
    }
    prompt.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(interpret_answer(&line, suggestion))
}

/// Map a typed answer to a directory; empty means cancel
fn interpret_answer(line: &str, suggestion: Option<&Path>) -> Option<PathBuf> {
    let answer = line.trim();
    if answer.is_empty() {
        return None;
    }
    if answer == "." {
        if let Some(s) = suggestion {
            return Some(s.to_path_buf());
        }
    }
    Some(expand_home(answer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fixed_picker_returns_existing_root() {
        let temp = TempDir::new().unwrap();
        let picker = FixedPicker::new(temp.path());
        assert_eq!(picker.pick().await.unwrap(), Some(temp.path().to_path_buf()));
    }

    #[tokio::test]
    async fn fixed_picker_cancels_for_missing_root() {
        let temp = TempDir::new().unwrap();
        let picker = FixedPicker::new(temp.path().join("nope"));
        assert_eq!(picker.pick().await.unwrap(), None);
    }

    #[test]
    fn empty_answer_cancels() {
        assert_eq!(interpret_answer("\n", None), None);
        assert_eq!(interpret_answer("   \r\n", Some(Path::new("/dl"))), None);
    }

    #[test]
    fn dot_takes_suggestion() {
        assert_eq!(
            interpret_answer(".\n", Some(Path::new("/dl"))),
            Some(PathBuf::from("/dl"))
        );
    }

    #[test]
    fn typed_path_is_used() {
        assert_eq!(
            interpret_answer("/srv/out\n", Some(Path::new("/dl"))),
            Some(PathBuf::from("/srv/out"))
        );
    }

    #[test]
    fn answer_is_read_from_the_given_terminal() {
        let mut terminal = io::Cursor::new(b"/srv/out\n".to_vec());
        let mut prompt = Vec::new();

        let answer = read_answer_from(&mut terminal, &mut prompt, Some(Path::new("/dl"))).unwrap();
        assert_eq!(answer, Some(PathBuf::from("/srv/out")));
        assert!(String::from_utf8(prompt)
            .unwrap()
            .contains("Target directory (Enter to cancel, '.' for /dl)"));
    }

    #[test]
    fn closed_terminal_cancels() {
        let mut terminal = io::Cursor::new(Vec::new());
        let answer = read_answer_from(&mut terminal, &mut io::sink(), None).unwrap();
        assert_eq!(answer, None);
    }

    #[test]
    fn gate_starts_open() {
        assert!(!InputGate::new().is_paused());
    }

    #[test]
    fn pause_is_seen_by_every_clone_until_dropped() {
        let gate = InputGate::new();
        let reader = gate.clone();

        let pause = gate.pause();
        assert!(reader.is_paused());
        drop(pause);
        assert!(!reader.is_paused());
    }
}
