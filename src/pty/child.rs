use std::io;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::PtyError;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How the shell process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

impl ExitStatus {
    fn from_raw(status: libc::c_int) -> Self {
        if libc::WIFSIGNALED(status) {
            ExitStatus::Signaled(libc::WTERMSIG(status))
        } else {
            ExitStatus::Exited(libc::WEXITSTATUS(status))
        }
    }

    /// Shell-style exit code: the exit code itself, or `128 + signal`.
    pub fn code(&self) -> i32 {
        match *self {
            ExitStatus::Exited(code) => code,
            ExitStatus::Signaled(signal) => 128 + signal,
        }
    }

    pub fn success(&self) -> bool {
        *self == ExitStatus::Exited(0)
    }
}

/// The forked shell. Reaped exactly once; the status is cached afterwards.
#[derive(Debug)]
pub struct ChildProcess {
    pid: libc::pid_t,
    status: Option<ExitStatus>,
}

impl ChildProcess {
    pub(crate) fn new(pid: libc::pid_t) -> Self {
        Self { pid, status: None }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Reap the child if it has exited, without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, PtyError> {
        self.waitpid(libc::WNOHANG)
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> Result<ExitStatus, PtyError> {
        loop {
            if let Some(status) = self.waitpid(0)? {
                return Ok(status);
            }
        }
    }

    /// Wait up to `timeout` for the child to exit.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>, PtyError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Send `signal` to the child's process group. The child is a session
    /// leader, so its group id equals its pid.
    pub fn signal_group(&self, signal: libc::c_int) -> Result<(), PtyError> {
        if self.status.is_some() {
            return Ok(());
        }
        if unsafe { libc::kill(-self.pid, signal) } == -1 {
            let source = io::Error::last_os_error();
            if source.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(PtyError::Signal {
                pid: self.pid,
                signal,
                source,
            });
        }
        Ok(())
    }

    /// Reap the child, escalating if it outlives `grace`: first SIGHUP to
    /// its process group, then SIGKILL.
    ///
    /// Callers close the PTY master first, which already hangs up the
    /// shell in the common case.
    pub fn terminate(&mut self, grace: Duration) -> Result<ExitStatus, PtyError> {
        if let Some(status) = self.wait_timeout(grace)? {
            return Ok(status);
        }
        warn!(pid = self.pid, "Shell still running after hangup, sending SIGHUP");
        self.signal_group(libc::SIGHUP)?;
        if let Some(status) = self.wait_timeout(grace)? {
            return Ok(status);
        }
        warn!(pid = self.pid, "Shell ignored SIGHUP, sending SIGKILL");
        self.signal_group(libc::SIGKILL)?;
        self.wait()
    }

    fn waitpid(&mut self, flags: libc::c_int) -> Result<Option<ExitStatus>, PtyError> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        let mut raw: libc::c_int = 0;
        loop {
            let ret = unsafe { libc::waitpid(self.pid, &mut raw, flags) };
            if ret == -1 {
                let source = io::Error::last_os_error();
                if source.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(PtyError::Wait {
                    pid: self.pid,
                    source,
                });
            }
            if ret == 0 {
                return Ok(None);
            }
            let status = ExitStatus::from_raw(raw);
            debug!(pid = self.pid, ?status, "Shell reaped");
            self.status = Some(status);
            return Ok(Some(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_shell_convention() {
        assert_eq!(ExitStatus::Exited(0).code(), 0);
        assert_eq!(ExitStatus::Exited(3).code(), 3);
        assert_eq!(ExitStatus::Signaled(libc::SIGHUP).code(), 129);
        assert_eq!(ExitStatus::Signaled(libc::SIGKILL).code(), 137);
    }

    #[test]
    fn only_clean_exit_is_success() {
        assert!(ExitStatus::Exited(0).success());
        assert!(!ExitStatus::Exited(1).success());
        assert!(!ExitStatus::Signaled(libc::SIGTERM).success());
    }
}
