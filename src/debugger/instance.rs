//! Debug server process spawning and control.
//!
//! This module spawns the debug server with both output streams piped and
//! non-blocking, and stops it with SIGTERM followed by SIGKILL once the grace
//! period runs out.

use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use super::{DebuggerError, OutputStream, ProcessController, SupervisedProcess};

/// Interval between exit status checks while stopping.
pub const DEFAULT_STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long a stopping debugger may take before it is killed.
pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Timing of the SIGTERM-then-SIGKILL stop sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTiming {
    pub poll_interval: Duration,
    pub grace_period: Duration,
}

impl Default for StopTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_STOP_POLL_INTERVAL,
            grace_period: DEFAULT_STOP_GRACE_PERIOD,
        }
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    NotRunning,
    /// The process exited within the grace period.
    Exited,
    /// The process had to be killed.
    Killed,
}

/// The supervised debug server.
#[derive(Debug)]
pub struct DebuggerInstance {
    command_path: PathBuf,
    fixed_args: Vec<String>,
    timing: StopTiming,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl DebuggerInstance {
    /// Create an instance bound to the debugger binary at `command_path`.
    #[must_use]
    pub fn new(command_path: impl Into<PathBuf>) -> Self {
        Self {
            command_path: command_path.into(),
            fixed_args: Vec::new(),
            timing: StopTiming::default(),
            child: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Arguments placed before the program to debug, e.g. `:2345`.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fixed_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_stop_timing(mut self, timing: StopTiming) -> Self {
        self.timing = timing;
        self
    }

    #[must_use]
    pub fn command_path(&self) -> &Path {
        &self.command_path
    }

    #[must_use]
    pub fn fixed_args(&self) -> &[String] {
        &self.fixed_args
    }

    #[must_use]
    pub fn stop_timing(&self) -> StopTiming {
        self.timing
    }

    /// Full argument vector: fixed arguments, the program, then its arguments.
    #[must_use]
    pub fn build_args(&self, program: &str, program_args: &[String]) -> Vec<String> {
        let mut args = self.fixed_args.clone();
        args.push(program.to_string());
        args.extend(program_args.iter().cloned());
        args
    }

    /// Spawn the debugger against `program`. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns `DebuggerError` if the process cannot be spawned or its pipes
    /// cannot be made non-blocking. The instance is left not running.
    pub fn spawn(&mut self, program: &str, program_args: &[String]) -> Result<(), DebuggerError> {
        if self.child.is_some() {
            return Ok(());
        }

        let args = self.build_args(program, program_args);
        let mut child = Command::new(&self.command_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DebuggerError::from_spawn(e, &self.command_path))?;

        let pipes = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => set_nonblocking(&stdout)
                .and_then(|()| set_nonblocking(&stderr))
                .map(|()| (stdout, stderr)),
            _ => Err(DebuggerError::MissingPipes),
        };

        match pipes {
            Ok((stdout, stderr)) => {
                tracing::info!(
                    pid = child.id(),
                    command = %self.command_path.display(),
                    args = ?args,
                    "Debugger started"
                );
                self.child = Some(child);
                self.stdout = Some(stdout);
                self.stderr = Some(stderr);
                Ok(())
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e)
            }
        }
    }

    /// Stop the debugger: close its pipes, send SIGTERM, and SIGKILL it if it
    /// has not exited when the grace period ends.
    ///
    /// The instance is always left not running.
    pub fn terminate(&mut self) -> StopOutcome {
        self.stdout = None;
        self.stderr = None;
        let Some(mut child) = self.child.take() else {
            return StopOutcome::NotRunning;
        };

        let pid = child.id();
        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM not delivered");
        }

        let deadline = Instant::now() + self.timing.grace_period;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::info!(pid, %status, "Debugger stopped");
                    return StopOutcome::Exited;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(pid, error = %e, "Cannot query debugger exit status");
                    break;
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(self.timing.poll_interval);
        }

        tracing::warn!(
            pid,
            grace_ms = self.timing.grace_period.as_millis(),
            "Debugger ignored SIGTERM, killing"
        );
        if let Err(e) = child.kill() {
            tracing::warn!(pid, error = %e, "Failed to kill debugger");
        }
        let _ = child.wait();
        StopOutcome::Killed
    }
}

impl ProcessController for DebuggerInstance {
    fn start(&mut self, program: &str, args: &[String]) -> bool {
        match self.spawn(program, args) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, program, "Failed to start debugger");
                false
            }
        }
    }

    fn stop(&mut self) -> bool {
        self.terminate();
        true
    }
}

impl SupervisedProcess for DebuggerInstance {
    fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn output_fd(&self, stream: OutputStream) -> Option<BorrowedFd<'_>> {
        match stream {
            OutputStream::Stdout => self.stdout.as_ref().map(AsFd::as_fd),
            OutputStream::Stderr => self.stderr.as_ref().map(AsFd::as_fd),
        }
    }

    fn read_output(&mut self, stream: OutputStream, buf: &mut [u8]) -> io::Result<usize> {
        let not_running = || io::Error::from(io::ErrorKind::NotConnected);
        match stream {
            OutputStream::Stdout => self.stdout.as_mut().ok_or_else(not_running)?.read(buf),
            OutputStream::Stderr => self.stderr.as_mut().ok_or_else(not_running)?.read(buf),
        }
    }

    fn clear_after_external_exit(&mut self) {
        self.stdout = None;
        self.stderr = None;
        let Some(mut child) = self.child.take() else {
            return;
        };

        let pid = child.id();
        match child.try_wait() {
            Ok(Some(status)) => tracing::info!(pid, %status, "Debugger exited on its own"),
            Ok(None) => {
                tracing::warn!(pid, "Debugger closed its output but is still alive, killing");
                let _ = child.kill();
                let _ = child.wait();
            }
            Err(e) => tracing::warn!(pid, error = %e, "Cannot query debugger exit status"),
        }
    }
}

impl Drop for DebuggerInstance {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.terminate();
        }
    }
}

fn set_nonblocking(fd: &impl AsRawFd) -> Result<(), DebuggerError> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}
