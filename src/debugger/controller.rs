//! Seams between the reconciler, the dispatcher and the debug server.

use std::io;
use std::os::fd::BorrowedFd;

/// Starts and stops the debug server on behalf of the reconciler.
pub trait ProcessController {
    /// Launch the debug server against `program` with `args`.
    ///
    /// Returns `true` if the server is running afterwards, including when it
    /// was already running.
    fn start(&mut self, program: &str, args: &[String]) -> bool;

    /// Stop the debug server. Returns `true` once it is no longer running.
    fn stop(&mut self) -> bool;
}

/// Which output pipe of the debug server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A controller whose output pipes can be multiplexed by the dispatcher.
pub trait SupervisedProcess: ProcessController {
    /// Process id while running.
    fn pid(&self) -> Option<u32>;

    fn is_running(&self) -> bool {
        self.pid().is_some()
    }

    /// Read end of the given pipe. Present iff the process is running.
    fn output_fd(&self, stream: OutputStream) -> Option<BorrowedFd<'_>>;

    /// Non-blocking read from the given pipe. `Ok(0)` is end of stream.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` when no data is available, `NotConnected` when the
    /// process is not running, or the underlying read error.
    fn read_output(&mut self, stream: OutputStream, buf: &mut [u8]) -> io::Result<usize>;

    /// Forget a process that went away without being stopped.
    fn clear_after_external_exit(&mut self);
}
