//! Pseudo-terminal management for the recorded shell.
//!
//! - [`allocate`]: open an unused master and resolve its slave path.
//! - [`spawn`]: fork the shell as a session leader on the slave.
//! - [`PtySession`]: the master, slave path and child, owned for the whole
//!   session.
//! - [`ResizeWatcher`]: forwards the outer terminal's size to the master on
//!   every SIGWINCH.

mod allocator;
mod child;
mod resize;
mod session;
mod spawn;

use std::io;
use thiserror::Error;

use crate::term::TermError;

pub use allocator::{allocate, allocate_with_limit, AllocatedPty, SLAVE_PATH_MAX};
pub use child::{ChildProcess, ExitStatus};
pub use resize::{ResizePropagator, ResizeWatcher};
pub use session::PtySession;
pub use spawn::{spawn, SlaveTemplate};

/// Errors raised while setting up or tearing down the PTY session.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("Cannot create master PTY: {source}")]
    Allocation {
        #[source]
        source: io::Error,
    },

    #[error("Failed updating slave ownership and permissions: {source}")]
    Permission {
        #[source]
        source: io::Error,
    },

    #[error("Cannot obtain slave name: {source}")]
    Protocol {
        #[source]
        source: io::Error,
    },

    #[error("Slave name '{path}' is too large ({len} bytes), cannot fit into {limit} bytes")]
    Overflow {
        path: String,
        len: usize,
        limit: usize,
    },

    #[error("Shell path '{path}' contains an interior NUL byte")]
    InvalidShell { path: String },

    #[error("Cannot fork shell process: {source}")]
    Fork {
        #[source]
        source: io::Error,
    },

    #[error("Failed waiting for child {pid}: {source}")]
    Wait {
        pid: i32,
        #[source]
        source: io::Error,
    },

    #[error("Failed sending signal {signal} to child {pid}: {source}")]
    Signal {
        pid: i32,
        signal: i32,
        #[source]
        source: io::Error,
    },

    #[error("Cannot install signal handlers: {source}")]
    SignalHandlers {
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Term(#[from] TermError),
}
