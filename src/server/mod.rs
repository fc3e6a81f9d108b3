//! The bootstrap server's event loop.
//!
//! # Architecture
//!
//! ```text
//! clients ──TCP──> EventDispatcher ──receive/force──> Bootstrapper ──start/stop──> debugger
//!    ^                  |   ^                                                         |
//!    |                  |   └──────────────── stdout / stderr pipes ─────────────────┘
//!    └── broadcast <────┘
//! ```
//!
//! Everything runs on one thread. Sockets and pipes are non-blocking; only
//! stopping the debugger blocks, bounded by its grace period.

mod broadcast;
mod buffer;
mod dispatcher;
mod error;
mod handles;

pub use broadcast::SubscriberBroadcast;
pub use buffer::IoBuffer;
pub use dispatcher::{DispatchSettings, EventDispatcher, ShutdownHandle};
pub use error::DispatchError;
pub use handles::Role;
