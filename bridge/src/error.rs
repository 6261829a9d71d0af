//! Error types shared across the three contexts.
//!
//! Cancellation and parse failures are not errors here: they travel as typed
//! response fields. These types cover the failures that do propagate.

use std::time::Duration;

use thiserror::Error;

/// Failure of a cross-context message exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Receiving context is gone (channel closed)
    #[error("{0} context is unreachable")]
    Closed(&'static str),

    /// No reply within the round-trip bound
    #[error("{context} context response timeout after {elapsed:?}")]
    Timeout {
        context: &'static str,
        elapsed: Duration,
    },

    /// Handler dropped the reply without answering
    #[error("no response from {0} context")]
    NoResponse(&'static str),

    /// Frame could not be encoded or decoded
    #[error("message codec error: {0}")]
    Codec(String),

    /// Frame exceeded the protocol limit
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Codec(err.to_string())
    }
}

/// Outcome of a failed privileged-context bring-up, shared by every waiter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BringUpError {
    #[error("privileged context creation failed: {0}")]
    CreationFailed(String),

    #[error("privileged context readiness timeout after {0:?}")]
    ReadinessTimeout(Duration),
}

/// Failure reported by the storage primitive
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path segment: {0:?}")]
    InvalidName(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory is not writable: {0}")]
    NotWritable(String),

    #[error("directory picker failed: {0}")]
    Picker(String),
}

/// Failure of a directory store operation
#[derive(Error, Debug)]
pub enum StoreError {
    /// User dismissed the directory prompt
    #[error("directory selection cancelled")]
    Cancelled,

    #[error("empty file path")]
    EmptyPath,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StoreError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }
}

/// Clipboard could not be read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("clipboard unavailable: {0}")]
pub struct ClipboardError(pub String);
