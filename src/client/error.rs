//! Client error types.

use crate::protocol::ProtocolError;

/// Errors that can occur while talking to a bootstrap server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to connect to the server.
    #[error("Failed to connect to {address}: {source}")]
    ConnectionFailed {
        address: String,
        source: std::io::Error,
    },

    /// The operation timed out.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Reading or writing the connection failed.
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server sent bytes that are not a valid packet.
    #[error("Server sent an unrecognized packet")]
    InvalidResponse,
}
