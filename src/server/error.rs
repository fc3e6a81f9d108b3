//! Dispatcher error types.

use crate::watcher::WatcherError;

/// Errors that end or prevent the event loop.
///
/// Per-connection failures never surface here; they close the connection.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The readiness wait failed with something other than an interruption.
    #[error("Readiness wait failed: {0}")]
    Poll(#[source] nix::Error),

    /// The listening socket could not be prepared.
    #[error("Listener error: {0}")]
    Io(#[from] std::io::Error),

    /// The file watcher could not be created.
    #[error(transparent)]
    Watcher(#[from] WatcherError),
}
