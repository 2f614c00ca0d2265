//! Command-line interface.
//!
//! Flags override the config file; the config file overrides built-in
//! defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Run an interactive shell in a pseudo-terminal and record its output.
#[derive(Debug, Parser)]
#[command(name = "ptyscribe", version)]
#[command(about = "Run an interactive shell in a pseudo-terminal and record everything it prints")]
pub struct Cli {
    /// Transcript file (created or truncated)
    pub transcript: Option<PathBuf>,

    /// Config file (default: <config dir>/ptyscribe/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Shell to run instead of $SHELL
    #[arg(short, long, value_name = "PATH")]
    pub shell: Option<PathBuf>,

    /// Debug log file
    #[arg(long, value_name = "PATH", conflicts_with = "no_log")]
    pub log_file: Option<PathBuf>,

    /// Disable the debug log
    #[arg(long)]
    pub no_log: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the current terminal size and exit
    Size,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(transcript) = &self.transcript {
            config.transcript.path = transcript.clone();
        }
        if let Some(shell) = &self.shell {
            config.shell.program = Some(shell.clone());
        }
        if let Some(log_file) = &self.log_file {
            config.logging.path = log_file.clone();
        }
        if self.no_log {
            config.logging.enabled = false;
        }
    }
}
