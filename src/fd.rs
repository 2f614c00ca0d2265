//! Raw descriptor helpers shared by the relay and shutdown signalling.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use tracing::warn;

/// Create an anonymous pipe. Both ends are close-on-exec so the shell never
/// inherits them.
pub fn pipe() -> io::Result<(File, File)> {
    let mut fds: [RawFd; 2] = [-1; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    // Take ownership first so both ends are closed if fcntl fails.
    let reader = unsafe { File::from_raw_fd(fds[0]) };
    let writer = unsafe { File::from_raw_fd(fds[1]) };
    set_cloexec(reader.as_raw_fd())?;
    set_cloexec(writer.as_raw_fd())?;
    Ok((reader, writer))
}

pub(crate) fn set_cloexec(fd: RawFd) -> io::Result<()> {
    if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Which of the two watched descriptors became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Stop,
}

/// Block until `source` is readable (or hung up) or `stop` is readable.
///
/// Uses `select()` rather than `poll()`: `poll()` on character devices is
/// unreliable on macOS. An interrupted wait (EINTR, e.g. from SIGWINCH) is
/// re-issued. `stop` wins when both are ready.
pub fn wait_readable(source: BorrowedFd<'_>, stop: BorrowedFd<'_>) -> io::Result<Readiness> {
    wait(source, Interest::Read, stop)
}

/// Block until `target` accepts a write or `stop` is readable. Same rules
/// as [`wait_readable`].
pub fn wait_writable(target: BorrowedFd<'_>, stop: BorrowedFd<'_>) -> io::Result<Readiness> {
    wait(target, Interest::Write, stop)
}

#[derive(Clone, Copy)]
enum Interest {
    Read,
    Write,
}

fn wait(fd: BorrowedFd<'_>, interest: Interest, stop: BorrowedFd<'_>) -> io::Result<Readiness> {
    let fd = fd.as_raw_fd();
    let stop = stop.as_raw_fd();
    let limit = libc::FD_SETSIZE as RawFd;
    if fd >= limit || stop >= limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "descriptor out of range for select()",
        ));
    }

    unsafe {
        let mut read_fds: libc::fd_set = std::mem::zeroed();
        let mut write_fds: libc::fd_set = std::mem::zeroed();
        loop {
            libc::FD_ZERO(&mut read_fds);
            libc::FD_ZERO(&mut write_fds);
            libc::FD_SET(stop, &mut read_fds);
            match interest {
                Interest::Read => libc::FD_SET(fd, &mut read_fds),
                Interest::Write => libc::FD_SET(fd, &mut write_fds),
            }

            let ret = libc::select(
                fd.max(stop) + 1,
                &mut read_fds,
                &mut write_fds,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if libc::FD_ISSET(stop, &read_fds) {
                return Ok(Readiness::Stop);
            }
            let ready = match interest {
                Interest::Read => libc::FD_ISSET(fd, &read_fds),
                Interest::Write => libc::FD_ISSET(fd, &write_fds),
            };
            if ready {
                return Ok(Readiness::Ready);
            }
        }
    }
}

/// `O_NONBLOCK` on an open file description for as long as the guard
/// lives. The original status flags are put back on drop.
///
/// The flag is shared by every descriptor duplicated from the same open, so
/// holding it on a terminal also affects the invoking shell until dropped.
pub struct NonBlocking {
    fd: OwnedFd,
    flags: libc::c_int,
}

impl NonBlocking {
    pub fn enable(fd: BorrowedFd<'_>) -> io::Result<Self> {
        let fd = fd.try_clone_to_owned()?;
        let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
        if flags == -1 {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, flags })
    }
}

impl Drop for NonBlocking {
    fn drop(&mut self) {
        if unsafe { libc::fcntl(self.fd.as_raw_fd(), libc::F_SETFL, self.flags) } == -1 {
            warn!(
                "Failed to restore descriptor flags: {}",
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsFd;

    #[test]
    fn stop_takes_priority_over_source() {
        let (source_rx, mut source_tx) = pipe().unwrap();
        let (stop_rx, mut stop_tx) = pipe().unwrap();
        source_tx.write_all(b"x").unwrap();
        stop_tx.write_all(b"x").unwrap();

        let ready = wait_readable(source_rx.as_fd(), stop_rx.as_fd()).unwrap();
        assert_eq!(ready, Readiness::Stop);
    }

    #[test]
    fn closed_writer_reports_source_ready() {
        let (source_rx, source_tx) = pipe().unwrap();
        let (stop_rx, _stop_tx) = pipe().unwrap();
        drop(source_tx);

        let ready = wait_readable(source_rx.as_fd(), stop_rx.as_fd()).unwrap();
        assert_eq!(ready, Readiness::Ready);
    }

    #[test]
    fn pipe_ends_are_close_on_exec() {
        let (reader, writer) = pipe().unwrap();
        for fd in [reader.as_raw_fd(), writer.as_raw_fd()] {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }

    #[test]
    fn writable_pipe_is_ready_unless_stopped() {
        let (_rx, tx) = pipe().unwrap();
        let (stop_rx, mut stop_tx) = pipe().unwrap();
        assert_eq!(
            wait_writable(tx.as_fd(), stop_rx.as_fd()).unwrap(),
            Readiness::Ready
        );

        stop_tx.write_all(b"x").unwrap();
        assert_eq!(
            wait_writable(tx.as_fd(), stop_rx.as_fd()).unwrap(),
            Readiness::Stop
        );
    }

    #[test]
    fn full_pipe_waits_for_stop() {
        let (_rx, mut tx) = pipe().unwrap();
        let (stop_rx, mut stop_tx) = pipe().unwrap();
        let _nonblocking = NonBlocking::enable(tx.as_fd()).unwrap();
        let chunk = [0u8; 4096];
        while tx.write(&chunk).is_ok() {}

        stop_tx.write_all(b"x").unwrap();
        assert_eq!(
            wait_writable(tx.as_fd(), stop_rx.as_fd()).unwrap(),
            Readiness::Stop
        );
    }

    #[test]
    fn nonblocking_flag_is_restored_on_drop() {
        let (rx, _tx) = pipe().unwrap();
        let flags = || unsafe { libc::fcntl(rx.as_raw_fd(), libc::F_GETFL) };
        let before = flags();
        {
            let _guard = NonBlocking::enable(rx.as_fd()).unwrap();
            assert_ne!(flags() & libc::O_NONBLOCK, 0);
        }
        assert_eq!(flags(), before);
    }
}
