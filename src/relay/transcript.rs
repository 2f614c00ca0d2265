use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Transcript file: created (or truncated) once at session start, written
/// only by the output pump, flushed and closed at teardown.
#[derive(Debug)]
pub struct Transcript {
    file: File,
    path: PathBuf,
    bytes: u64,
}

impl Transcript {
    /// Owner, group and other may read and write, subject to the umask.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o666)
            .open(&path)?;
        debug!(path = %path.display(), "Transcript opened");
        Ok(Self {
            file,
            path,
            bytes: 0,
        })
    }

    /// Flush to stable storage and close. Returns the number of bytes
    /// recorded.
    pub fn close(mut self) -> io::Result<u64> {
        self.file.flush()?;
        self.file.sync_data()?;
        debug!(path = %self.path.display(), bytes = self.bytes, "Transcript closed");
        Ok(self.bytes)
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
