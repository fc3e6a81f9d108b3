//! Async client for the bootstrap server.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{
    encode, next_frame, FrameStatus, PacketType, ProjectDescription, SubscriberUpdate,
};

use super::ClientError;

/// Default timeout for connecting and sending (4 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

const READ_CHUNK: usize = 4096;

/// Client for pushing commands to a bootstrap server.
///
/// Every command opens its own connection, sends one packet and closes it.
#[derive(Debug, Clone)]
pub struct BootstrapClient {
    address: String,
    timeout: Duration,
}

impl BootstrapClient {
    /// Creates a client for the server at `address` (`host:port`).
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the timeout for connecting and sending.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replaces the server's project description.
    ///
    /// # Errors
    ///
    /// Returns an error if the description cannot be encoded, the connection
    /// fails, or the operation times out.
    pub async fn push_description(
        &self,
        description: &ProjectDescription,
    ) -> Result<(), ClientError> {
        let packet = description.to_packet()?;
        self.send(&packet).await
    }

    /// Starts the debugger regardless of file state.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the operation times out.
    pub async fn force_start(&self) -> Result<(), ClientError> {
        self.send(&encode(PacketType::ForceDebuggerStart, None)).await
    }

    /// Stops the debugger regardless of file state.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the operation times out.
    pub async fn force_stop(&self) -> Result<(), ClientError> {
        self.send(&encode(PacketType::ForceDebuggerStop, None)).await
    }

    /// Opens a connection that receives every broadcast update.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the operation times out.
    pub async fn subscribe(&self) -> Result<Subscription, ClientError> {
        let stream = self
            .bounded(async {
                let mut stream = self.connect().await?;
                stream
                    .write_all(&encode(PacketType::SubscribeRequest, None))
                    .await?;
                stream.flush().await?;
                Ok(stream)
            })
            .await?;

        tracing::debug!(address = %self.address, "Subscribed");
        Ok(Subscription {
            stream,
            buffer: Vec::new(),
        })
    }

    async fn send(&self, packet: &[u8]) -> Result<(), ClientError> {
        self.bounded(async {
            let mut stream = self.connect().await?;
            stream.write_all(packet).await?;
            stream.flush().await?;
            stream.shutdown().await?;
            Ok(())
        })
        .await?;

        tracing::debug!(address = %self.address, bytes = packet.len(), "Packet sent");
        Ok(())
    }

    async fn connect(&self) -> Result<TcpStream, ClientError> {
        TcpStream::connect(&self.address)
            .await
            .map_err(|source| ClientError::ConnectionFailed {
                address: self.address.clone(),
                source,
            })
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        // Safe: timeout values are never going to exceed u64::MAX milliseconds
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = self.timeout.as_millis() as u64;

        match tokio::time::timeout(self.timeout, operation).await {
            Ok(inner) => inner,
            Err(_) => Err(ClientError::Timeout(timeout_ms)),
        }
    }
}

/// A subscribed connection yielding broadcast updates.
#[derive(Debug)]
pub struct Subscription {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl Subscription {
    /// Waits for the next update. Returns `None` once the server closes the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, the server sends an unrecognized
    /// packet, or an update payload is not valid JSON.
    pub async fn next_update(&mut self) -> Result<Option<SubscriberUpdate>, ClientError> {
        loop {
            if let Some(update) = self.take_buffered()? {
                return Ok(Some(update));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(bytes = self.buffer.len(), "Partial packet at close");
                }
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_buffered(&mut self) -> Result<Option<SubscriberUpdate>, ClientError> {
        loop {
            let (kind, consumed, update) = match next_frame(&self.buffer) {
                FrameStatus::Complete(frame) => {
                    let update = if frame.kind == PacketType::SubscribeResponse {
                        Some(SubscriberUpdate::from_json(frame.payload_str()?)?)
                    } else {
                        None
                    };
                    (frame.kind, frame.consumed, update)
                }
                FrameStatus::Incomplete => return Ok(None),
                FrameStatus::Unknown => {
                    self.buffer.clear();
                    return Err(ClientError::InvalidResponse);
                }
            };
            self.buffer.drain(..consumed);

            match update {
                Some(update) => return Ok(Some(update)),
                None => tracing::debug!(?kind, "Ignoring unexpected packet from server"),
            }
        }
    }
}
