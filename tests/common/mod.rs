//! Shared test utilities: PTY pairs standing in for a real terminal, and
//! throwaway shell scripts.

#![allow(dead_code, unused_imports)]

use std::fs::{self, File, OpenOptions};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use ptyscribe::lifecycle::SessionOptions;
use ptyscribe::pty;
use ptyscribe::term::{OuterTerminal, TerminalModeSnapshot};

static EXEC_LOCK: Mutex<()> = Mutex::new(());

/// Serializes writing a script and exec'ing it. A script still open for
/// writing in a concurrently forked child fails to exec with ETXTBSY.
pub fn exec_lock() -> MutexGuard<'static, ()> {
    EXEC_LOCK.lock()
}

/// A PTY whose slave is opened in this process without becoming its
/// controlling terminal.
pub struct PtyPair {
    pub master: File,
    pub slave: File,
    pub slave_path: PathBuf,
}

impl PtyPair {
    pub fn open() -> Self {
        let allocated = pty::allocate().expect("Failed to allocate PTY");
        let slave = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&allocated.slave_path)
            .expect("Failed to open PTY slave");
        Self {
            master: File::from(allocated.master),
            slave,
            slave_path: allocated.slave_path,
        }
    }

    /// The slave side, presented as the terminal the proxy runs in.
    pub fn outer(&self) -> OuterTerminal {
        OuterTerminal::new(
            self.slave.try_clone().expect("Failed to dup slave"),
            self.slave.try_clone().expect("Failed to dup slave"),
        )
    }

    pub fn slave_mode(&self) -> TerminalModeSnapshot {
        TerminalModeSnapshot::capture(self.slave.as_fd()).expect("Failed to read slave mode")
    }

    /// Stop the line discipline from rewriting output (`\n` → `\r\n`).
    pub fn disable_output_processing(&self) {
        let mut termios = *self.slave_mode().termios();
        termios.c_oflag &= !libc::OPOST;
        let rc = unsafe { libc::tcsetattr(self.slave.as_raw_fd(), libc::TCSANOW, &termios) };
        assert_eq!(rc, 0, "tcsetattr failed");
    }
}

/// Write an executable `#!/bin/sh` script into `dir`.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}

/// Poll `check` until it returns true or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Whether `pid` still names a process (zombies included).
pub fn process_exists(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Read from `source` until `needle` has been seen. Returns everything read.
pub fn read_until(mut source: &File, needle: &[u8]) -> Vec<u8> {
    use std::io::Read;

    let mut seen = Vec::new();
    let mut buf = [0u8; 256];
    while !seen.windows(needle.len()).any(|w| w == needle) {
        match source.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
    seen
}

/// Pid a script recorded with `echo $$ > <path>`.
pub fn read_pid(path: &Path) -> i32 {
    fs::read_to_string(path)
        .expect("Failed to read pid file")
        .trim()
        .parse()
        .expect("Pid file does not hold a pid")
}

pub fn session_options(shell: PathBuf, transcript: &Path) -> SessionOptions {
    SessionOptions {
        shell,
        transcript: transcript.to_path_buf(),
        chunk_size: 256,
        max_slave_path: 512,
        grace: Duration::from_millis(200),
    }
}
