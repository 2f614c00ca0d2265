use std::ffi::{CStr, OsStr, OsString};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use tracing::debug;

use super::PtyError;
use crate::fd::set_cloexec;

/// Longest slave path accepted by [`allocate`], including the terminating NUL.
pub const SLAVE_PATH_MAX: usize = 512;

/// A freshly opened master whose slave is unlocked and ready to be opened
/// by another process.
#[derive(Debug)]
pub struct AllocatedPty {
    pub master: OwnedFd,
    pub slave_path: PathBuf,
}

/// Open an unused PTY master, bounded by [`SLAVE_PATH_MAX`].
pub fn allocate() -> Result<AllocatedPty, PtyError> {
    allocate_with_limit(SLAVE_PATH_MAX)
}

/// Open an unused PTY master and resolve its slave path, failing with
/// [`PtyError::Overflow`] if the path (plus NUL) does not fit in `limit`
/// bytes. The master is closed on every error path.
pub fn allocate_with_limit(limit: usize) -> Result<AllocatedPty, PtyError> {
    let raw = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY) };
    if raw == -1 {
        return Err(PtyError::Allocation {
            source: io::Error::last_os_error(),
        });
    }
    let master = unsafe { OwnedFd::from_raw_fd(raw) };
    debug!(fd = raw, "Master PTY has been created");

    set_cloexec(raw).map_err(|source| PtyError::Allocation { source })?;

    if unsafe { libc::grantpt(raw) } == -1 {
        return Err(PtyError::Permission {
            source: io::Error::last_os_error(),
        });
    }
    if unsafe { libc::unlockpt(raw) } == -1 {
        return Err(PtyError::Permission {
            source: io::Error::last_os_error(),
        });
    }
    debug!("Slave ownership set and slave unlocked");

    let name = slave_name(master.as_fd()).map_err(|source| PtyError::Protocol { source })?;
    let len = name.as_bytes().len();
    if len >= limit {
        return Err(PtyError::Overflow {
            path: name.to_string_lossy().into_owned(),
            len,
            limit,
        });
    }
    debug!(slave = %name.to_string_lossy(), "Slave name resolved");

    Ok(AllocatedPty {
        master,
        slave_path: PathBuf::from(name),
    })
}

#[cfg(target_os = "linux")]
fn slave_name(master: BorrowedFd<'_>) -> io::Result<OsString> {
    const MAX_BUFFER: usize = 64 * 1024;

    let mut buf = vec![0u8; 64];
    loop {
        let rc = unsafe { libc::ptsname_r(master.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if rc == 0 {
            let name = CStr::from_bytes_until_nul(&buf)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "unterminated slave name"))?;
            return Ok(OsStr::from_bytes(name.to_bytes()).to_os_string());
        }
        if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
            let grown = buf.len() * 2;
            buf.resize(grown, 0);
            continue;
        }
        return Err(io::Error::from_raw_os_error(rc));
    }
}

#[cfg(not(target_os = "linux"))]
fn slave_name(master: BorrowedFd<'_>) -> io::Result<OsString> {
    // ptsname() hands back a static buffer; copy it out immediately.
    let ptr = unsafe { libc::ptsname(master.as_raw_fd()) };
    if ptr.is_null() {
        return Err(io::Error::last_os_error());
    }
    let name = unsafe { CStr::from_ptr(ptr) };
    Ok(OsStr::from_bytes(name.to_bytes()).to_os_string())
}
