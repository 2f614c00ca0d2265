use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pty::SLAVE_PATH_MAX;
use crate::relay::DEFAULT_CHUNK_SIZE;

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub shell: ShellConfig,
    pub transcript: TranscriptConfig,
    pub relay: RelayConfig,
    pub pty: PtyConfig,
    pub teardown: TeardownConfig,
    pub logging: LoggingConfig,
}

/// Which shell to run on the slave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Explicit shell; wins over the environment when set.
    pub program: Option<PathBuf>,
    /// Environment variable naming the shell (default: "SHELL").
    pub env_var: String,
    /// Used when neither of the above yields a shell (default: "/bin/sh").
    pub fallback: PathBuf,
}

impl ShellConfig {
    /// Pick the shell: `program`, else a non-empty `env_value`, else
    /// `fallback`.
    pub fn resolve(&self, env_value: Option<OsString>) -> PathBuf {
        if let Some(program) = &self.program {
            if !program.as_os_str().is_empty() {
                return program.clone();
            }
        }
        match env_value {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => self.fallback.clone(),
        }
    }

    /// [`ShellConfig::resolve`] against the current environment.
    pub fn resolve_from_env(&self) -> PathBuf {
        self.resolve(std::env::var_os(&self.env_var))
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: None,
            env_var: "SHELL".to_string(),
            fallback: PathBuf::from("/bin/sh"),
        }
    }
}

/// Where the session is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Transcript file, truncated at session start (default: "output").
    pub path: PathBuf,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bytes read per pump iteration (default: 256).
    pub chunk_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    /// Upper bound for the slave device path, NUL included (default: 512).
    pub max_slave_path: usize,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            max_slave_path: SLAVE_PATH_MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeardownConfig {
    /// How long to wait for the shell at each teardown step, in
    /// milliseconds (default: 500).
    pub grace_ms: u64,
}

impl TeardownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self { grace_ms: 500 }
    }
}

/// Debug log. Always a file: the terminal itself carries the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Appended to, never truncated (default: "pty.log").
    pub path: PathBuf,
    /// `EnvFilter` directive; `RUST_LOG` overrides it (default: "debug").
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("pty.log"),
            level: "debug".to_string(),
        }
    }
}
