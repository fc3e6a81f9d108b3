//! Debugger Bootstrap - keeps a debug server running against the files a
//! client says it should debug.

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod debugger;
pub mod display;
pub mod protocol;
pub mod server;
pub mod watcher;
