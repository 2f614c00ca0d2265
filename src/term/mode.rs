use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use super::TermError;

/// The outer terminal's mode, captured once before the session touches it.
#[derive(Clone)]
pub struct TerminalModeSnapshot {
    termios: libc::termios,
}

impl TerminalModeSnapshot {
    /// Capture the current attributes of the terminal behind `fd`.
    pub fn capture(fd: BorrowedFd<'_>) -> Result<Self, TermError> {
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd.as_raw_fd(), &mut termios) } == -1 {
            return Err(TermError::GetAttributes {
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self { termios })
    }

    pub fn termios(&self) -> &libc::termios {
        &self.termios
    }

    /// The raw-mode variant of this snapshot: no canonical processing, no
    /// signal characters, no echo, no extended input processing, no output
    /// post-processing; reads return as soon as one byte is available.
    pub fn to_raw(&self) -> Self {
        let mut t = self.termios;

        t.c_lflag &= !(libc::ICANON | libc::ISIG | libc::IEXTEN | libc::ECHO);
        t.c_iflag &= !(libc::BRKINT
            | libc::ICRNL
            | libc::IGNBRK
            | libc::IGNCR
            | libc::INLCR
            | libc::INPCK
            | libc::ISTRIP
            | libc::IXON
            | libc::PARMRK);
        t.c_oflag &= !libc::OPOST;

        t.c_cc[libc::VMIN] = 1;
        t.c_cc[libc::VTIME] = 0;

        Self { termios: t }
    }

    /// Re-apply exactly this mode to the terminal behind `fd`, immediately.
    pub fn restore(&self, fd: BorrowedFd<'_>) -> Result<(), TermError> {
        self.apply(fd, libc::TCSANOW)
    }

    fn apply(&self, fd: BorrowedFd<'_>, when: libc::c_int) -> Result<(), TermError> {
        if unsafe { libc::tcsetattr(fd.as_raw_fd(), when, &self.termios) } == -1 {
            return Err(TermError::SetAttributes {
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl PartialEq for TerminalModeSnapshot {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (&self.termios, &other.termios);
        a.c_iflag == b.c_iflag
            && a.c_oflag == b.c_oflag
            && a.c_cflag == b.c_cflag
            && a.c_lflag == b.c_lflag
            && a.c_cc == b.c_cc
    }
}

impl Eq for TerminalModeSnapshot {}

impl fmt::Debug for TerminalModeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalModeSnapshot")
            .field("iflag", &format_args!("{:#x}", self.termios.c_iflag))
            .field("oflag", &format_args!("{:#x}", self.termios.c_oflag))
            .field("cflag", &format_args!("{:#x}", self.termios.c_cflag))
            .field("lflag", &format_args!("{:#x}", self.termios.c_lflag))
            .field("vmin", &self.termios.c_cc[libc::VMIN])
            .field("vtime", &self.termios.c_cc[libc::VTIME])
            .finish()
    }
}

/// Switch the terminal behind `fd` to raw mode, returning the mode it had
/// before.
pub fn set_raw(fd: BorrowedFd<'_>) -> Result<TerminalModeSnapshot, TermError> {
    let previous = TerminalModeSnapshot::capture(fd)?;
    previous.to_raw().apply(fd, libc::TCSAFLUSH)?;
    Ok(previous)
}

struct PendingRestore {
    fd: OwnedFd,
    snapshot: TerminalModeSnapshot,
}

/// Raw mode held for the lifetime of the guard.
///
/// The captured mode is restored at most once: by an explicit
/// [`RawModeGuard::restore`], on drop, or from the panic hook installed by
/// [`RawModeGuard::enter`], whichever runs first.
pub struct RawModeGuard {
    pending: Arc<Mutex<Option<PendingRestore>>>,
}

impl RawModeGuard {
    /// Put the terminal behind `fd` into the raw variant of `snapshot`.
    pub fn enter(fd: BorrowedFd<'_>, snapshot: &TerminalModeSnapshot) -> Result<Self, TermError> {
        // Own a duplicate so the restore path never depends on the caller's
        // descriptor still being open.
        let owned = fd
            .try_clone_to_owned()
            .map_err(|source| TermError::Duplicate {
                stream: "terminal",
                source,
            })?;
        snapshot.to_raw().apply(fd, libc::TCSAFLUSH)?;
        debug!("Outer terminal switched to raw mode");

        let guard = Self {
            pending: Arc::new(Mutex::new(Some(PendingRestore {
                fd: owned,
                snapshot: snapshot.clone(),
            }))),
        };
        guard.install_panic_hook();
        Ok(guard)
    }

    /// Restore the captured mode now. Later calls are no-ops.
    pub fn restore(&self) -> Result<(), TermError> {
        let Some(pending) = self.pending.lock().take() else {
            return Ok(());
        };
        pending.snapshot.restore(pending.fd.as_fd())?;
        debug!("Outer terminal mode restored");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.pending.lock().is_some()
    }

    fn install_panic_hook(&self) {
        let pending = Arc::clone(&self.pending);
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(pending) = pending.lock().take() {
                let _ = pending.snapshot.restore(pending.fd.as_fd());
            }
            default_hook(info);
        }));
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            error!("Failed to restore terminal mode: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cooked() -> TerminalModeSnapshot {
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        termios.c_lflag = libc::ICANON | libc::ISIG | libc::IEXTEN | libc::ECHO | libc::ECHOE;
        termios.c_iflag = libc::ICRNL | libc::IXON | libc::BRKINT | libc::IMAXBEL;
        termios.c_oflag = libc::OPOST | libc::ONLCR;
        termios.c_cflag = libc::CS8 | libc::CREAD;
        termios.c_cc[libc::VMIN] = 4;
        termios.c_cc[libc::VTIME] = 7;
        TerminalModeSnapshot { termios }
    }

    #[test]
    fn raw_clears_line_discipline_flags() {
        let raw = cooked().to_raw();
        let t = raw.termios();
        assert_eq!(t.c_lflag & (libc::ICANON | libc::ISIG | libc::IEXTEN | libc::ECHO), 0);
        assert_eq!(t.c_iflag & (libc::ICRNL | libc::IXON | libc::BRKINT), 0);
        assert_eq!(t.c_oflag & libc::OPOST, 0);
        assert_eq!(t.c_cc[libc::VMIN], 1);
        assert_eq!(t.c_cc[libc::VTIME], 0);
    }

    #[test]
    fn raw_keeps_unrelated_flags() {
        let raw = cooked().to_raw();
        let t = raw.termios();
        assert_ne!(t.c_lflag & libc::ECHOE, 0);
        assert_ne!(t.c_iflag & libc::IMAXBEL, 0);
        assert_ne!(t.c_oflag & libc::ONLCR, 0);
        assert_eq!(t.c_cflag, libc::CS8 | libc::CREAD);
    }

    #[test]
    fn snapshots_compare_by_mode() {
        assert_eq!(cooked(), cooked());
        assert_ne!(cooked(), cooked().to_raw());
    }
}
