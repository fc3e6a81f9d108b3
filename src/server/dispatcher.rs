//! The single-threaded readiness loop.
//!
//! One iteration waits for the listener, client sockets and the debugger's
//! output pipes, handles whatever is ready, keeps the debugger's pipes
//! registered exactly while it runs, then sweeps the project files.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::bootstrap::{Bootstrapper, FileDifferences, FileProbe};
use crate::config::ServerConfig;
use crate::debugger::{OutputStream, SupervisedProcess};
use crate::protocol::{next_frame, tag, FrameStatus, ProjectDescription};
use crate::watcher::{FileEvent, ProjectWatcher};

use super::handles::{Entry, Handle, Request};
use super::{DispatchError, Role, SubscriberBroadcast};

/// Tunables of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Upper bound on one readiness wait; also the sweep period when idle.
    pub poll_timeout: Duration,
    /// Bytes read per readiness event.
    pub read_chunk_size: usize,
    /// Unsent bytes past which a subscriber is considered stalled and dropped.
    pub subscriber_backlog: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            read_chunk_size: 4096,
            subscriber_backlog: 1 << 20,
        }
    }
}

impl From<&ServerConfig> for DispatchSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            poll_timeout: config.poll_timeout(),
            read_chunk_size: config.read_chunk_size.max(1),
            subscriber_backlog: config.subscriber_backlog_bytes,
        }
    }
}

/// Cloneable flag that asks a running loop to return.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for signal handler registration.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Ready {
    token: u64,
    revents: PollFlags,
}

const CLOSED: PollFlags = PollFlags::POLLHUP
    .union(PollFlags::POLLERR)
    .union(PollFlags::POLLNVAL);

/// Multiplexes the listener, client connections and debugger output.
pub struct EventDispatcher<P, C> {
    bootstrapper: Bootstrapper<P, C>,
    entries: Vec<Entry>,
    next_token: u64,
    broadcast: SubscriberBroadcast,
    watcher: Option<ProjectWatcher>,
    settings: DispatchSettings,
    shutdown: ShutdownHandle,
    /// Pid whose pipes are currently registered.
    registered_pid: Option<u32>,
    scratch: Vec<u8>,
}

impl<P, C> EventDispatcher<P, C>
where
    P: FileProbe,
    C: SupervisedProcess,
{
    /// Take over an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be made non-blocking.
    pub fn new(listener: TcpListener, bootstrapper: Bootstrapper<P, C>) -> Result<Self, DispatchError> {
        listener.set_nonblocking(true)?;
        let settings = DispatchSettings::default();
        let mut dispatcher = Self {
            bootstrapper,
            entries: Vec::new(),
            next_token: 0,
            broadcast: SubscriberBroadcast::new(),
            watcher: None,
            settings,
            shutdown: ShutdownHandle::new(),
            registered_pid: None,
            scratch: vec![0; settings.read_chunk_size],
        };
        dispatcher.register(Role::Listener, Handle::Listener(listener));
        Ok(dispatcher)
    }

    #[must_use]
    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.scratch = vec![0; settings.read_chunk_size.max(1)];
        self.settings = settings;
        self
    }

    /// Feed filesystem notifications into reconciliation.
    #[must_use]
    pub fn with_watcher(mut self, mut watcher: ProjectWatcher) -> Self {
        watcher.retarget(self.bootstrapper.project());
        self.watcher = Some(watcher);
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.entries
            .iter()
            .find_map(|entry| match &entry.handle {
                Handle::Listener(listener) => Some(listener.local_addr()),
                _ => None,
            })
            .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::NotConnected)))
    }

    #[must_use]
    pub fn bootstrapper(&self) -> &Bootstrapper<P, C> {
        &self.bootstrapper
    }

    pub fn bootstrapper_mut(&mut self) -> &mut Bootstrapper<P, C> {
        &mut self.bootstrapper
    }

    /// Roles of every registered handle, in registration order.
    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        self.entries.iter().map(|entry| entry.role).collect()
    }

    /// Loop until shutdown is requested or the readiness wait fails, then
    /// stop the debugger.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Poll`] if the readiness wait fails.
    pub fn run(&mut self) -> Result<(), DispatchError> {
        if let Ok(address) = self.local_addr() {
            tracing::info!(%address, "Waiting for incoming connections");
        }

        let result = loop {
            if self.shutdown.is_requested() {
                tracing::info!("Shutdown requested");
                break Ok(());
            }
            if let Err(e) = self.poll_once() {
                tracing::error!(error = %e, "Event loop failed");
                break Err(e);
            }
        };

        self.stop_debugger();
        result
    }

    /// Run a single iteration of the loop.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Poll`] if the readiness wait fails with
    /// anything other than an interruption.
    pub fn poll_once(&mut self) -> Result<(), DispatchError> {
        self.sync_debugger_handles();
        self.flush_broadcast();

        let mut timeout = self.settings.poll_timeout;
        loop {
            let ready = self.wait_ready(timeout)?;
            if !self.process_ready(&ready) {
                break;
            }
            // Registrations changed; rescan without blocking.
            self.sync_debugger_handles();
            self.flush_broadcast();
            timeout = Duration::ZERO;
        }

        self.sync_debugger_handles();
        self.reconcile_files();
        self.sync_debugger_handles();
        self.flush_broadcast();
        Ok(())
    }

    fn register(&mut self, role: Role, handle: Handle) {
        let token = self.next_token;
        self.next_token += 1;
        self.entries.push(Entry::new(token, role, handle));
    }

    fn close(&mut self, index: usize) {
        let entry = self.entries.remove(index);
        tracing::debug!(role = ?entry.role, token = entry.token, "Handle closed");
    }

    fn position(&self, token: u64) -> Option<usize> {
        self.entries.iter().position(|entry| entry.token == token)
    }

    fn wait_ready(&self, timeout: Duration) -> Result<Vec<Ready>, DispatchError> {
        let controller = self.bootstrapper.controller();
        let mut tokens = Vec::with_capacity(self.entries.len());
        let mut fds = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let fd = match &entry.handle {
                Handle::Listener(listener) => Some(listener.as_fd()),
                Handle::Socket(stream) => Some(stream.as_fd()),
                Handle::Debugger(stream) => controller.output_fd(*stream),
            };
            let Some(fd) = fd else {
                tracing::error!(role = ?entry.role, "Registered handle has no descriptor");
                continue;
            };
            let mut events = PollFlags::POLLIN;
            if !entry.write.is_empty() {
                events |= PollFlags::POLLOUT;
            }
            fds.push(PollFd::new(fd, events));
            tokens.push(entry.token);
        }

        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => Ok(Vec::new()),
            Ok(_) => Ok(fds
                .iter()
                .zip(tokens)
                .filter_map(|(fd, token)| {
                    let revents = fd.revents()?;
                    (!revents.is_empty()).then_some(Ready { token, revents })
                })
                .collect()),
            Err(Errno::EINTR) => Ok(Vec::new()),
            Err(e) => Err(DispatchError::Poll(e)),
        }
    }

    /// Handle ready entries in registration order. Returns `true` as soon as
    /// the set of registered handles or the debugger process changes.
    fn process_ready(&mut self, ready: &[Ready]) -> bool {
        for &Ready { token, revents } in ready {
            let Some(index) = self.position(token) else {
                continue;
            };
            let pid_before = self.bootstrapper.controller().pid();

            let structural = match self.entries[index].role {
                Role::Listener => self.on_listener(index, revents),
                Role::Client | Role::SubscribedClient => self.on_client(index, revents),
                Role::DebuggerStdout | Role::DebuggerStderr => self.on_debugger(index, revents),
            };
            let dropped = self.flush_broadcast();

            if structural || dropped || self.bootstrapper.controller().pid() != pid_before {
                return true;
            }
        }
        false
    }

    fn on_listener(&mut self, index: usize, revents: PollFlags) -> bool {
        if !revents.contains(PollFlags::POLLIN) {
            tracing::error!(?revents, "Unexpected condition on listener");
            return false;
        }
        let Handle::Listener(listener) = &self.entries[index].handle else {
            return false;
        };

        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    tracing::warn!(%peer, error = %e, "Dropping connection");
                    return false;
                }
                tracing::info!(%peer, "Connection accepted");
                self.register(Role::Client, Handle::Socket(stream));
                true
            }
            Err(e) if is_transient(&e) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
                false
            }
        }
    }

    fn on_client(&mut self, index: usize, revents: PollFlags) -> bool {
        if revents.contains(PollFlags::POLLIN) {
            if self.read_client(index) {
                return true;
            }
        } else if revents.intersects(CLOSED) {
            tracing::warn!(?revents, "Client hung up without readable data");
            self.close(index);
            return true;
        }

        revents.contains(PollFlags::POLLOUT) && self.write_client(index)
    }

    /// Returns `true` if the connection was closed.
    fn read_client(&mut self, index: usize) -> bool {
        let entry = &mut self.entries[index];
        let Handle::Socket(stream) = &mut entry.handle else {
            return false;
        };

        match stream.read(&mut self.scratch) {
            Ok(0) => {
                tracing::info!("Client disconnected");
                self.close(index);
                true
            }
            Ok(n) => {
                entry.read.append(&self.scratch[..n]);
                self.interpret(index);
                false
            }
            Err(e) if is_transient(&e) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Read from client failed");
                self.close(index);
                true
            }
        }
    }

    /// Returns `true` if the connection was closed.
    fn write_client(&mut self, index: usize) -> bool {
        let entry = &mut self.entries[index];
        let Handle::Socket(stream) = &mut entry.handle else {
            return false;
        };

        match stream.write(entry.write.as_slice()) {
            Ok(0) => {
                tracing::warn!("Subscriber accepted no data, closing");
                self.close(index);
                true
            }
            Ok(n) => {
                entry.write.consume(n);
                false
            }
            Err(e) if is_transient(&e) => false,
            Err(e) => {
                tracing::info!(error = %e, "Subscriber disconnected");
                self.close(index);
                true
            }
        }
    }

    /// Decode and act on every complete packet in the entry's read buffer.
    fn interpret(&mut self, index: usize) {
        loop {
            let entry = &mut self.entries[index];
            let request = match next_frame(entry.read.as_slice()) {
                FrameStatus::Complete(frame) => {
                    let request = Request::from_frame(&frame);
                    let consumed = frame.consumed;
                    entry.read.consume(consumed);
                    request
                }
                FrameStatus::Incomplete => return,
                FrameStatus::Unknown => {
                    tracing::warn!(bytes = entry.read.len(), "Unrecognized client data, discarding");
                    entry.read.clear();
                    return;
                }
            };
            self.handle_request(index, request);
        }
    }

    fn handle_request(&mut self, index: usize, request: Request) {
        match request {
            Request::Describe(Ok(description)) => self.receive_description(description),
            Request::Describe(Err(e)) => {
                tracing::warn!(error = %e, "Dropping invalid project description");
            }
            Request::Subscribe => {
                tracing::info!(token = self.entries[index].token, "Client subscribed");
                self.entries[index].role = Role::SubscribedClient;
            }
            Request::StrayResponse => {
                tracing::warn!("Ignoring subscribe response sent by a client");
            }
            Request::ForceStart => {
                let changed = self.bootstrapper.force_start();
                tracing::info!(changed, "Force start requested");
            }
            Request::ForceStop => {
                let changed = self.bootstrapper.force_stop();
                tracing::info!(changed, "Force stop requested");
            }
        }
    }

    fn receive_description(&mut self, description: ProjectDescription) {
        self.bootstrapper.receive(description);
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.retarget(self.bootstrapper.project());
        }

        self.broadcast
            .push(tag::PROJECT_DESCRIPTION, "New project description received");
        let differences = self.bootstrapper.differences();
        for change in differences.changes_since(&FileDifferences::default()) {
            self.broadcast.push_update(change.to_update());
        }
    }

    fn on_debugger(&mut self, index: usize, revents: PollFlags) -> bool {
        let Handle::Debugger(stream) = self.entries[index].handle else {
            return false;
        };
        if !revents.intersects(PollFlags::POLLIN | CLOSED) {
            return false;
        }

        match self
            .bootstrapper
            .controller_mut()
            .read_output(stream, &mut self.scratch)
        {
            Ok(0) => {
                self.on_debugger_exit();
                true
            }
            Ok(n) => {
                let text = String::from_utf8_lossy(&self.scratch[..n]).into_owned();
                self.broadcast.push(output_tag(stream), text);
                false
            }
            Err(e) if is_transient(&e) => false,
            Err(e) => {
                tracing::warn!(?stream, error = %e, "Reading debugger output failed");
                self.on_debugger_exit();
                true
            }
        }
    }

    fn on_debugger_exit(&mut self) {
        self.bootstrapper.controller_mut().clear_after_external_exit();
        self.bootstrapper.indicate_external_stop();
        self.sync_debugger_handles();
    }

    /// Register or drop the debugger's pipes to match the process.
    fn sync_debugger_handles(&mut self) {
        let pid = self.bootstrapper.controller().pid();

        if pid == self.registered_pid {
            if pid.is_some() {
                for stream in [OutputStream::Stdout, OutputStream::Stderr] {
                    let role = Role::from(stream);
                    if !self.entries.iter().any(|entry| entry.role == role) {
                        tracing::error!(?role, "Debugger handle missing, registering again");
                        self.register(role, Handle::Debugger(stream));
                    }
                }
            }
            return;
        }

        if let Some(old) = self.registered_pid.take() {
            self.entries.retain(|entry| !entry.role.is_debugger());
            self.broadcast.push(tag::DEBUGGER_STOPPED, format!("pid: {old}"));
        }
        if let Some(new) = pid {
            self.register(Role::DebuggerStdout, Handle::Debugger(OutputStream::Stdout));
            self.register(Role::DebuggerStderr, Handle::Debugger(OutputStream::Stderr));
            self.broadcast.push(tag::DEBUGGER_STARTED, format!("pid: {new}"));
        }
        self.registered_pid = pid;
    }

    /// Apply watcher events and sweep the project files, broadcasting what
    /// changed.
    fn reconcile_files(&mut self) {
        if !self.bootstrapper.is_project_loaded() {
            if let Some(watcher) = self.watcher.as_mut() {
                watcher.drain();
            }
            return;
        }

        let before = self.bootstrapper.differences();

        if let Some(watcher) = self.watcher.as_mut() {
            let mut changed = Vec::new();
            for event in watcher.drain() {
                match event {
                    FileEvent::Removed(file) => self.bootstrapper.indicate_removed(&file),
                    FileEvent::Changed(file) => changed.push(file),
                }
            }
            if !changed.is_empty() {
                self.bootstrapper.update_file_hashes(changed);
            }
        }
        self.bootstrapper.sweep();

        let after = self.bootstrapper.differences();
        for change in after.changes_since(&before) {
            self.broadcast.push_update(change.to_update());
        }
    }

    /// Queue pending updates on every subscriber. Returns `true` if a
    /// stalled subscriber was disconnected.
    fn flush_broadcast(&mut self) -> bool {
        if self.broadcast.is_empty() {
            return false;
        }
        let targets = self
            .entries
            .iter_mut()
            .filter(|entry| entry.role == Role::SubscribedClient)
            .map(|entry| &mut entry.write);
        self.broadcast.flush_into(targets);

        let limit = self.settings.subscriber_backlog;
        let stalled: Vec<u64> = self
            .entries
            .iter()
            .filter(|entry| entry.role == Role::SubscribedClient && entry.write.len() > limit)
            .map(|entry| entry.token)
            .collect();
        for &token in &stalled {
            if let Some(index) = self.position(token) {
                tracing::warn!(
                    token,
                    pending = self.entries[index].write.len(),
                    limit,
                    "Subscriber is not reading, disconnecting"
                );
                self.close(index);
            }
        }
        !stalled.is_empty()
    }

    fn stop_debugger(&mut self) {
        self.bootstrapper.force_stop();
        let controller = self.bootstrapper.controller_mut();
        if controller.is_running() {
            controller.stop();
        }
        self.sync_debugger_handles();
        self.flush_broadcast();
    }
}

fn output_tag(stream: OutputStream) -> &'static str {
    match stream {
        OutputStream::Stdout => tag::DEBUGGER_STDOUT,
        OutputStream::Stderr => tag::DEBUGGER_STDERR,
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
