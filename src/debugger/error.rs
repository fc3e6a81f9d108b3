//! Debugger supervision error types.

use std::path::{Path, PathBuf};

/// Errors that can occur while starting the debug server.
#[derive(thiserror::Error, Debug)]
pub enum DebuggerError {
    /// The debugger binary was not found.
    #[error("Debugger binary not found: {0}")]
    NotFound(PathBuf),
    /// Permission denied when spawning.
    #[error("Permission denied running debugger: {0}")]
    PermissionDenied(PathBuf),
    /// The child came up without its output pipes.
    #[error("Debugger output pipes unavailable")]
    MissingPipes,
    /// A raw system call failed.
    #[error("System call failed: {0}")]
    Sys(#[from] nix::Error),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DebuggerError {
    /// Create a `DebuggerError` from a spawn error, classifying common cases.
    pub(crate) fn from_spawn(err: std::io::Error, command: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(command.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(command.to_path_buf()),
            _ => Self::Io(err),
        }
    }
}
