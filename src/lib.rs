//! ptyscribe: an interactive shell behind a pseudo-terminal, with every byte
//! the shell prints copied to a transcript file.
//!
//! # Architecture
//!
//! - [`pty`]: PTY allocation, session bootstrap (fork/setsid/exec), child
//!   reaping and window-size propagation.
//! - [`term`]: The outer terminal: mode snapshots, raw mode, window size.
//! - [`relay`]: The two byte pumps and the transcript file.
//! - [`lifecycle`]: Orchestrates a whole session and computes the exit code.
//! - [`shutdown`]: Session-end signalling shared by the pumps and watchers.

pub mod args;
pub mod config;
pub mod fd;
pub mod lifecycle;
pub mod logging;
pub mod pty;
pub mod relay;
pub mod shutdown;
pub mod term;
