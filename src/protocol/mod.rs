//! Wire protocol between the bootstrap server and its clients.
//!
//! # Framing
//!
//! Every packet starts with a two byte header:
//!
//! ```text
//! +---------+-------------+---------------------------------+
//! | version | packet type | payload (type dependent)        |
//! |  0x01   |   0..=4     | NUL terminated UTF-8, or absent |
//! +---------+-------------+---------------------------------+
//! ```
//!
//! Payload length is never sent. A payload-bearing packet is complete once its
//! NUL terminator has arrived.
//!
//! # Example
//!
//! ```
//! use debugger_bootstrap::protocol::{next_frame, FrameStatus, PacketType, ProjectDescription};
//!
//! let description = ProjectDescription::new("App", "abcd");
//! let packet = description.to_packet().unwrap();
//!
//! match next_frame(&packet) {
//!     FrameStatus::Complete(frame) => assert_eq!(frame.kind, PacketType::ProjectDescription),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod error;
mod packet;
mod types;

pub use error::ProtocolError;
pub use packet::{
    decode, encode, encode_terminated, find_terminator, next_frame, Decoded, Frame, FrameStatus,
    PacketType, HEADER_SIZE, PROTOCOL_VERSION,
};
pub use types::{tag, Dependency, ProjectDescription, SubscriberUpdate};
