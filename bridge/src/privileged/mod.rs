//! Privileged context: the only place that holds a directory handle and touches files.

pub mod picker;
pub mod service;
pub mod storage;
pub mod store;

pub use picker::{DirectoryPicker, FixedPicker, GatePause, InputGate, TerminalPicker};
pub use service::PrivilegedFileService;
pub use storage::{LocalStorage, Permission, Storage};
pub use store::DirectoryStore;
