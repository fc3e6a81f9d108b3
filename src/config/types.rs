//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debugger::{StopTiming, DEFAULT_DEBUGGER_PATH};

/// Listener and event loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Upper bound on a single poll wait.
    pub poll_timeout_ms: u64,
    /// Bytes read per readiness event.
    pub read_chunk_size: usize,
    /// Watch project files for changes between polls.
    pub watch_files: bool,
    /// Unsent bytes a subscriber may accumulate before it is disconnected.
    pub subscriber_backlog_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            poll_timeout_ms: 1000,
            read_chunk_size: 4096,
            watch_files: true,
            subscriber_backlog_bytes: 1 << 20,
        }
    }
}

impl ServerConfig {
    /// `host:port` suitable for binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Debug server launch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Path of the debug server binary.
    pub path: String,
    /// Arguments placed before the program to debug.
    pub args: Vec<String>,
    /// Time allowed between SIGTERM and SIGKILL.
    pub stop_grace_ms: u64,
    /// Interval between exit checks while stopping.
    pub stop_poll_ms: u64,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DEBUGGER_PATH.to_string(),
            args: vec![":2345".to_string()],
            stop_grace_ms: 1000,
            stop_poll_ms: 10,
        }
    }
}

impl DebuggerConfig {
    #[must_use]
    pub fn stop_timing(&self) -> StopTiming {
        StopTiming {
            poll_interval: Duration::from_millis(self.stop_poll_ms),
            grace_period: Duration::from_millis(self.stop_grace_ms),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BootstrapConfig {
    pub server: ServerConfig,
    pub debugger: DebuggerConfig,
}
