use std::ffi::{CStr, CString};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use tracing::debug;

use super::allocator::allocate_with_limit;
use super::{ChildProcess, PtyError, PtySession};
use crate::term::{TerminalModeSnapshot, WindowSize};

/// Mode and size the slave is given before the shell starts.
#[derive(Debug, Clone, Default)]
pub struct SlaveTemplate {
    pub mode: Option<TerminalModeSnapshot>,
    pub size: Option<WindowSize>,
}

/// Allocate a PTY and fork `shell` onto its slave as a new session leader
/// with the slave as controlling terminal and standard streams.
///
/// The parent never opens the slave; it keeps only the master. Everything
/// the child needs is prepared before `fork()` so the child performs no
/// allocation before `exec`.
pub fn spawn(
    shell: &Path,
    template: &SlaveTemplate,
    max_slave_path: usize,
) -> Result<PtySession, PtyError> {
    let pty = allocate_with_limit(max_slave_path)?;

    let slave = CString::new(pty.slave_path.as_os_str().as_bytes()).map_err(|err| {
        PtyError::Protocol {
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        }
    })?;
    let program =
        CString::new(shell.as_os_str().as_bytes()).map_err(|_| PtyError::InvalidShell {
            path: shell.display().to_string(),
        })?;
    let argv: [*const libc::c_char; 2] = [program.as_ptr(), ptr::null()];
    let termios = template.mode.as_ref().map(|mode| *mode.termios());
    let winsize = template.size.map(libc::winsize::from);

    let pid = unsafe { libc::fork() };
    if pid == -1 {
        return Err(PtyError::Fork {
            source: io::Error::last_os_error(),
        });
    }
    if pid == 0 {
        let request = ChildRequest {
            master: pty.master.as_raw_fd(),
            slave: &slave,
            program: &program,
            argv: &argv,
            termios: termios.as_ref(),
            winsize: winsize.as_ref(),
        };
        unsafe { request.exec() }
    }

    debug!(pid, shell = %shell.display(), slave = %pty.slave_path.display(), "Shell forked");
    Ok(PtySession::new(
        pty.master,
        pty.slave_path,
        ChildProcess::new(pid),
    ))
}

struct ChildRequest<'a> {
    master: RawFd,
    slave: &'a CStr,
    program: &'a CStr,
    argv: &'a [*const libc::c_char; 2],
    termios: Option<&'a libc::termios>,
    winsize: Option<&'a libc::winsize>,
}

impl ChildRequest<'_> {
    /// Runs in the forked child. Only async-signal-safe calls from here on;
    /// every failure ends the child with `_exit`.
    unsafe fn exec(&self) -> ! {
        if libc::setsid() == -1 {
            die(b"ptyscribe: cannot start session\n", 1);
        }

        libc::close(self.master);

        let slave = libc::open(self.slave.as_ptr(), libc::O_RDWR);
        if slave == -1 {
            die(b"ptyscribe: cannot open slave pty\n", 1);
        }

        // Linux grants the controlling terminal on open after setsid; BSD
        // and macOS need the explicit ioctl.
        if libc::ioctl(slave, libc::TIOCSCTTY as _, 0) == -1 {
            die(b"ptyscribe: cannot acquire controlling terminal\n", 1);
        }

        if let Some(termios) = self.termios {
            if libc::tcsetattr(slave, libc::TCSANOW, termios) == -1 {
                die(b"ptyscribe: cannot apply termios settings\n", 1);
            }
        }
        if let Some(winsize) = self.winsize {
            if libc::ioctl(slave, libc::TIOCSWINSZ as _, winsize) == -1 {
                die(b"ptyscribe: cannot set window size\n", 1);
            }
        }

        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(slave, target) != target {
                die(b"ptyscribe: cannot attach standard streams\n", 1);
            }
        }
        if slave > libc::STDERR_FILENO {
            libc::close(slave);
        }

        // Ignored dispositions survive exec and the Rust runtime ignores
        // SIGPIPE.
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);

        libc::execvp(self.program.as_ptr(), self.argv.as_ptr());
        die(b"ptyscribe: cannot exec shell\n", 127)
    }
}

fn die(message: &[u8], code: libc::c_int) -> ! {
    unsafe {
        libc::write(libc::STDERR_FILENO, message.as_ptr().cast(), message.len());
        libc::_exit(code)
    }
}
