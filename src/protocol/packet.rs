//! Packet header encoding and frame detection.

use super::ProtocolError;

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the `[version, type]` header.
pub const HEADER_SIZE: usize = 2;

/// Packet types that may appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client pushes a JSON project description (NUL terminated).
    ProjectDescription = 0,
    /// Client asks to receive broadcast updates. Header only.
    SubscribeRequest = 1,
    /// Server pushes a JSON `{tag, message}` update (NUL terminated).
    SubscribeResponse = 2,
    /// Client asks to start the debugger regardless of file state. Header only.
    ForceDebuggerStart = 3,
    /// Client asks to stop the debugger regardless of file state. Header only.
    ForceDebuggerStop = 4,
}

impl PacketType {
    /// Map a type byte to a packet type.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::ProjectDescription),
            1 => Some(Self::SubscribeRequest),
            2 => Some(Self::SubscribeResponse),
            3 => Some(Self::ForceDebuggerStart),
            4 => Some(Self::ForceDebuggerStop),
            _ => None,
        }
    }

    /// The type byte for this packet type.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether a NUL terminated payload follows the header.
    #[must_use]
    pub fn has_payload(self) -> bool {
        matches!(self, Self::ProjectDescription | Self::SubscribeResponse)
    }
}

/// Result of decoding a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A recognized header. The payload, if any, starts at `payload_offset`.
    Packet {
        kind: PacketType,
        payload_offset: usize,
    },
    /// Fewer bytes than a header.
    Incomplete,
    /// Wrong version or out of range type.
    Unknown,
}

/// Decode the header at the start of `buffer`.
#[must_use]
pub fn decode(buffer: &[u8]) -> Decoded {
    if buffer.len() < HEADER_SIZE {
        return Decoded::Incomplete;
    }
    if buffer[0] != PROTOCOL_VERSION {
        return Decoded::Unknown;
    }
    match PacketType::from_byte(buffer[1]) {
        Some(kind) => Decoded::Packet {
            kind,
            payload_offset: HEADER_SIZE,
        },
        None => Decoded::Unknown,
    }
}

/// Prepend a header to an optional payload.
///
/// The payload is copied verbatim, so payload-bearing packets must already
/// carry their terminator. See [`encode_terminated`].
#[must_use]
pub fn encode(kind: PacketType, payload: Option<&[u8]>) -> Vec<u8> {
    let payload = payload.unwrap_or_default();
    let mut packet = Vec::with_capacity(HEADER_SIZE + payload.len());
    packet.push(PROTOCOL_VERSION);
    packet.push(kind.as_byte());
    packet.extend_from_slice(payload);
    packet
}

/// Encode a packet whose payload is `text` followed by a NUL terminator.
///
/// # Errors
///
/// Returns [`ProtocolError::EmbeddedNul`] if `text` contains a NUL byte, since
/// the receiver would cut the payload short.
pub fn encode_terminated(kind: PacketType, text: &str) -> Result<Vec<u8>, ProtocolError> {
    if text.as_bytes().contains(&0) {
        return Err(ProtocolError::EmbeddedNul);
    }
    let mut packet = encode(kind, Some(text.as_bytes()));
    packet.push(0);
    Ok(packet)
}

/// Index of the first NUL byte at or after `from`.
#[must_use]
pub fn find_terminator(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .iter()
        .position(|&b| b == 0)
        .map(|i| i + from)
}

/// One complete packet found at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: PacketType,
    /// Payload bytes without the terminator. `None` for header-only packets.
    pub payload: Option<&'a [u8]>,
    /// Number of bytes the frame occupies, terminator included.
    pub consumed: usize,
}

impl Frame<'_> {
    /// The payload as UTF-8 text. Header-only frames yield an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidUtf8`] if the payload is not UTF-8.
    pub fn payload_str(&self) -> Result<&str, ProtocolError> {
        Ok(std::str::from_utf8(self.payload.unwrap_or_default())?)
    }
}

/// Outcome of looking for a complete frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus<'a> {
    Complete(Frame<'a>),
    /// Header or payload terminator has not arrived yet.
    Incomplete,
    /// The stream is corrupt; the caller should drop what it has buffered.
    Unknown,
}

/// Find the complete frame at the start of `buffer`, if any.
#[must_use]
pub fn next_frame(buffer: &[u8]) -> FrameStatus<'_> {
    let (kind, payload_offset) = match decode(buffer) {
        Decoded::Packet {
            kind,
            payload_offset,
        } => (kind, payload_offset),
        Decoded::Incomplete => return FrameStatus::Incomplete,
        Decoded::Unknown => return FrameStatus::Unknown,
    };

    if !kind.has_payload() {
        return FrameStatus::Complete(Frame {
            kind,
            payload: None,
            consumed: payload_offset,
        });
    }

    match find_terminator(buffer, payload_offset) {
        Some(end) => FrameStatus::Complete(Frame {
            kind,
            payload: Some(&buffer[payload_offset..end]),
            consumed: end + 1,
        }),
        None => FrameStatus::Incomplete,
    }
}
