use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use super::TermError;

/// Terminal dimensions, copied verbatim between devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl WindowSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }

    /// Read the current size of the terminal behind `fd` (TIOCGWINSZ).
    pub fn query(fd: BorrowedFd<'_>) -> Result<Self, TermError> {
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        if unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCGWINSZ as _, &mut ws) } == -1 {
            return Err(TermError::GetWindowSize {
                source: io::Error::last_os_error(),
            });
        }
        Ok(ws.into())
    }

    /// Set the size of the terminal behind `fd` (TIOCSWINSZ). On a PTY
    /// master this delivers SIGWINCH to the slave's foreground process group.
    pub fn apply(&self, fd: BorrowedFd<'_>) -> Result<(), TermError> {
        let ws = libc::winsize::from(*self);
        if unsafe { libc::ioctl(fd.as_raw_fd(), libc::TIOCSWINSZ as _, &ws) } == -1 {
            return Err(TermError::SetWindowSize {
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl From<libc::winsize> for WindowSize {
    fn from(ws: libc::winsize) -> Self {
        Self {
            rows: ws.ws_row,
            cols: ws.ws_col,
            pixel_width: ws.ws_xpixel,
            pixel_height: ws.ws_ypixel,
        }
    }
}

impl From<WindowSize> for libc::winsize {
    fn from(size: WindowSize) -> Self {
        libc::winsize {
            ws_row: size.rows,
            ws_col: size.cols,
            ws_xpixel: size.pixel_width,
            ws_ypixel: size.pixel_height,
        }
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}
