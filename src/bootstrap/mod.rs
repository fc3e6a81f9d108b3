//! Reconciliation of the desired project against the files on disk.
//!
//! The [`Bootstrapper`] keeps the debugger running exactly while every
//! required file exists with the wanted hash. File access goes through
//! [`FileProbe`] and process control through
//! [`ProcessController`](crate::debugger::ProcessController), so the state
//! machine can be driven without touching the disk or spawning anything.

mod differences;
mod probe;
mod reconciler;

pub use differences::{FileChange, FileDifferences};
pub use probe::{FileProbe, FsProbe};
pub use reconciler::{Bootstrapper, WantedVsActual};
