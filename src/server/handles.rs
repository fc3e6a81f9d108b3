//! Registered handles and what each one is for.

use std::net::{TcpListener, TcpStream};

use crate::debugger::OutputStream;
use crate::protocol::{Frame, PacketType, ProjectDescription, ProtocolError};

use super::IoBuffer;

/// Why a handle is in the wait set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Listener,
    Client,
    /// A client that asked for broadcast updates.
    SubscribedClient,
    DebuggerStdout,
    DebuggerStderr,
}

impl Role {
    #[must_use]
    pub fn is_debugger(self) -> bool {
        matches!(self, Self::DebuggerStdout | Self::DebuggerStderr)
    }

    #[must_use]
    pub fn is_client(self) -> bool {
        matches!(self, Self::Client | Self::SubscribedClient)
    }
}

impl From<OutputStream> for Role {
    fn from(stream: OutputStream) -> Self {
        match stream {
            OutputStream::Stdout => Self::DebuggerStdout,
            OutputStream::Stderr => Self::DebuggerStderr,
        }
    }
}

/// The resource behind an entry. Debugger pipes stay owned by the debugger
/// and are looked up when the wait set is built.
#[derive(Debug)]
pub(crate) enum Handle {
    Listener(TcpListener),
    Socket(TcpStream),
    Debugger(OutputStream),
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub token: u64,
    pub role: Role,
    pub handle: Handle,
    pub read: IoBuffer,
    pub write: IoBuffer,
}

impl Entry {
    pub fn new(token: u64, role: Role, handle: Handle) -> Self {
        Self {
            token,
            role,
            handle,
            read: IoBuffer::new(),
            write: IoBuffer::new(),
        }
    }
}

/// A decoded client packet, detached from the read buffer.
#[derive(Debug)]
pub(crate) enum Request {
    Describe(Result<ProjectDescription, ProtocolError>),
    Subscribe,
    /// Only the server should send these.
    StrayResponse,
    ForceStart,
    ForceStop,
}

impl Request {
    pub fn from_frame(frame: &Frame<'_>) -> Self {
        match frame.kind {
            PacketType::ProjectDescription => {
                Self::Describe(frame.payload_str().and_then(ProjectDescription::from_json))
            }
            PacketType::SubscribeRequest => Self::Subscribe,
            PacketType::SubscribeResponse => Self::StrayResponse,
            PacketType::ForceDebuggerStart => Self::ForceStart,
            PacketType::ForceDebuggerStop => Self::ForceStop,
        }
    }
}
