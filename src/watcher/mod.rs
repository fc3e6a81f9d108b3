//! Watcher module for project files.
//!
//! Turns filesystem notifications into reconciler inputs so the debugger
//! reacts to rebuilt or deleted files without waiting for the next sweep.

mod error;
mod project_watcher;

pub use error::WatcherError;
pub use project_watcher::{FileEvent, ProjectWatcher};
