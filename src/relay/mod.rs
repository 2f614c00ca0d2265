//! The two byte pumps between the outer terminal and the PTY master.
//!
//! - input pump: outer input → PTY master
//! - output pump: PTY master → outer output, then transcript
//!
//! Each pump waits on its source, and on every destination that can block,
//! together with the session's wake descriptor, so it can be stopped
//! whether it is idle or stuck behind a full destination. Writes must land
//! whole: a short write is a [`RelayError::ShortWrite`], never retried.

mod transcript;

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};

use thiserror::Error;
use tracing::debug;

use crate::fd::{wait_readable, wait_writable, Readiness};

pub use transcript::Transcript;

/// Read size used by both pumps unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid write length to {target}: wrote {written} of {expected} bytes")]
    ShortWrite {
        target: &'static str,
        expected: usize,
        written: usize,
    },

    #[error("Failed writing to {target}: {source}")]
    Write {
        target: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed waiting on {target}: {source}")]
    Wait {
        target: &'static str,
        #[source]
        source: io::Error,
    },
}

/// How a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source reported end-of-stream (or a read error).
    EndOfStream,
    /// The session ended elsewhere and the wake descriptor fired.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub end: PumpEnd,
    pub bytes: u64,
}

/// A named destination for pumped bytes.
pub struct Sink<'a> {
    label: &'static str,
    writer: &'a mut dyn Write,
    ready: Option<BorrowedFd<'a>>,
}

impl<'a> Sink<'a> {
    /// A destination that never blocks for long, such as a regular file.
    pub fn new(label: &'static str, writer: &'a mut dyn Write) -> Self {
        Self {
            label,
            writer,
            ready: None,
        }
    }

    /// A destination that can stall (a terminal or the PTY master). Each
    /// write first waits for `fd` to be writable; set it non-blocking so a
    /// write never parks the pump where the wake descriptor cannot reach it.
    pub fn with_fd(label: &'static str, writer: &'a mut dyn Write, fd: BorrowedFd<'a>) -> Self {
        Self {
            label,
            writer,
            ready: Some(fd),
        }
    }

    /// Write all of `bytes` in one call. Returns `Ok(false)` if `stop`
    /// fired before the destination became writable.
    fn write_exact(&mut self, bytes: &[u8], stop: BorrowedFd<'_>) -> Result<bool, RelayError> {
        loop {
            if let Some(fd) = self.ready {
                match wait_writable(fd, stop) {
                    Ok(Readiness::Stop) => return Ok(false),
                    Ok(Readiness::Ready) => {}
                    Err(source) => {
                        return Err(RelayError::Wait {
                            target: self.label,
                            source,
                        })
                    }
                }
            }
            match self.writer.write(bytes) {
                Ok(written) if written == bytes.len() => return Ok(true),
                Ok(written) => {
                    return Err(RelayError::ShortWrite {
                        target: self.label,
                        expected: bytes.len(),
                        written,
                    })
                }
                // Nothing was written; the call can be reissued whole.
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue
                }
                Err(source) => {
                    return Err(RelayError::Write {
                        target: self.label,
                        source,
                    })
                }
            }
        }
    }
}

/// Copy `source` into every sink, in sink order, one chunk at a time, until
/// the source ends or `stop` becomes readable.
pub fn pump<R: Read + AsFd>(
    name: &'static str,
    mut source: R,
    sinks: &mut [Sink<'_>],
    chunk_size: usize,
    stop: BorrowedFd<'_>,
) -> Result<PumpStats, RelayError> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut bytes = 0u64;
    let cancelled = |bytes: u64| -> Result<PumpStats, RelayError> {
        debug!(pump = name, bytes, "Pump cancelled");
        Ok(PumpStats {
            end: PumpEnd::Cancelled,
            bytes,
        })
    };

    loop {
        match wait_readable(source.as_fd(), stop) {
            Ok(Readiness::Stop) => return cancelled(bytes),
            Ok(Readiness::Ready) => {}
            Err(err) => {
                return Err(RelayError::Wait {
                    target: name,
                    source: err,
                })
            }
        }

        let count = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(count) => count,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                continue
            }
            // EIO on a master whose slave has closed lands here.
            Err(err) => {
                debug!(pump = name, "Read ended: {err}");
                break;
            }
        };

        for sink in sinks.iter_mut() {
            if !sink.write_exact(&buf[..count], stop)? {
                return cancelled(bytes);
            }
        }
        bytes += count as u64;
    }

    debug!(pump = name, bytes, "Pump reached end of stream");
    Ok(PumpStats {
        end: PumpEnd::EndOfStream,
        bytes,
    })
}

/// Outer terminal input → PTY master.
pub fn run_input_pump(
    input: &File,
    master: &File,
    chunk_size: usize,
    stop: BorrowedFd<'_>,
) -> Result<PumpStats, RelayError> {
    let mut writer = master;
    let mut sinks = [Sink::with_fd("master pty", &mut writer, master.as_fd())];
    pump("input", input, &mut sinks, chunk_size, stop)
}

/// PTY master → outer terminal output, then transcript.
pub fn run_output_pump(
    master: &File,
    output: &File,
    transcript: &mut Transcript,
    chunk_size: usize,
    stop: BorrowedFd<'_>,
) -> Result<PumpStats, RelayError> {
    let mut writer = output;
    let mut sinks = [
        Sink::with_fd("terminal output", &mut writer, output.as_fd()),
        Sink::new("transcript", transcript),
    ];
    pump("output", master, &mut sinks, chunk_size, stop)
}
