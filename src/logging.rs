use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize tracing into the configured log file.
///
/// Never logs to the terminal: stdout is in raw mode and carries the shell.
/// The file is appended to so several sessions share one log. `RUST_LOG`
/// takes precedence over the configured level.
///
/// Returns `Ok(false)` when logging is disabled or a subscriber is already
/// installed.
pub fn init_tracing(config: &LoggingConfig) -> io::Result<bool> {
    if !config.enabled {
        return Ok(false);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("debug"));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.path)?;

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .is_ok())
}
