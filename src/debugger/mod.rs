//! Debug server process supervision.
//!
//! [`DebuggerInstance`] owns at most one running debug server at a time and is
//! reused across start/stop cycles. The reconciler drives it through
//! [`ProcessController`]; the dispatcher additionally polls its output pipes
//! through [`SupervisedProcess`].

mod controller;
mod error;
mod instance;

pub use controller::{OutputStream, ProcessController, SupervisedProcess};
pub use error::DebuggerError;
pub use instance::{
    DebuggerInstance, StopOutcome, StopTiming, DEFAULT_STOP_GRACE_PERIOD,
    DEFAULT_STOP_POLL_INTERVAL,
};

/// Default debug server binary.
pub const DEFAULT_DEBUGGER_PATH: &str = "/usr/bin/gdbserver";
