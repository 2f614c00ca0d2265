use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use super::{ChildProcess, ExitStatus, PtyError};

const DROP_GRACE: Duration = Duration::from_millis(100);

/// The master side of the PTY plus the shell running on its slave.
///
/// The master is shared by reference between the pumps and the resize
/// propagator; only [`PtySession::close`] (or drop) closes it.
pub struct PtySession {
    master: Option<File>,
    slave_path: PathBuf,
    child: ChildProcess,
    status: Option<ExitStatus>,
}

impl PtySession {
    pub(crate) fn new(master: OwnedFd, slave_path: PathBuf, child: ChildProcess) -> Self {
        Self {
            master: Some(File::from(master)),
            slave_path,
            child,
            status: None,
        }
    }

    /// The PTY master. Only valid until the session is closed.
    pub fn master(&self) -> &File {
        match &self.master {
            Some(master) => master,
            None => unreachable!("PTY master used after close"),
        }
    }

    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }

    pub fn child_pid(&self) -> i32 {
        self.child.pid()
    }

    pub fn child_mut(&mut self) -> &mut ChildProcess {
        &mut self.child
    }

    /// Close the master, which hangs up the slave, and reap the shell.
    pub fn close(mut self, grace: Duration) -> Result<ExitStatus, PtyError> {
        self.shutdown(grace)
    }

    fn shutdown(&mut self, grace: Duration) -> Result<ExitStatus, PtyError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        if self.master.take().is_some() {
            debug!(slave = %self.slave_path.display(), "PTY master closed");
        }
        let status = self.child.terminate(grace)?;
        self.status = Some(status);
        Ok(status)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown(DROP_GRACE) {
            warn!("Failed to reap shell on drop: {err}");
        }
    }
}
