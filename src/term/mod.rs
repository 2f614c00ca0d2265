//! The outer (invoking) terminal: mode snapshots, raw mode and window size.

mod mode;
mod outer;
mod winsize;

use std::io;
use thiserror::Error;

pub use mode::{set_raw, RawModeGuard, TerminalModeSnapshot};
pub use outer::OuterTerminal;
pub use winsize::WindowSize;

/// Errors raised while querying or mutating a terminal device.
#[derive(Debug, Error)]
pub enum TermError {
    #[error("Failed to read terminal attributes: {source}")]
    GetAttributes {
        #[source]
        source: io::Error,
    },

    #[error("Failed to apply terminal attributes: {source}")]
    SetAttributes {
        #[source]
        source: io::Error,
    },

    #[error("Failed to read window size: {source}")]
    GetWindowSize {
        #[source]
        source: io::Error,
    },

    #[error("Failed to apply window size: {source}")]
    SetWindowSize {
        #[source]
        source: io::Error,
    },

    #[error("Failed to duplicate {stream} descriptor: {source}")]
    Duplicate {
        stream: &'static str,
        #[source]
        source: io::Error,
    },
}
