use std::os::fd::BorrowedFd;
use std::thread::{Scope, ScopedJoinHandle};

use signal_hook::consts::signal::SIGWINCH;
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, error};

use super::PtyError;
use crate::shutdown::{EndReason, ShutdownHandle};
use crate::term::WindowSize;

/// Copies the outer terminal's current size onto the PTY master.
///
/// Touches only the two descriptors it borrows, so it can run concurrently
/// with the pumps without coordination.
#[derive(Debug, Clone, Copy)]
pub struct ResizePropagator<'a> {
    outer: BorrowedFd<'a>,
    master: BorrowedFd<'a>,
}

impl<'a> ResizePropagator<'a> {
    pub fn new(outer: BorrowedFd<'a>, master: BorrowedFd<'a>) -> Self {
        Self { outer, master }
    }

    pub fn propagate(&self) -> Result<WindowSize, PtyError> {
        let size = WindowSize::query(self.outer)?;
        size.apply(self.master)?;
        Ok(size)
    }
}

/// SIGWINCH listener. Armed while the value exists; [`ResizeWatcher::stop`]
/// or dropping it disarms it.
///
/// The signal handler itself only wakes the watcher thread, which then does
/// the read-then-apply outside signal context. A failure to read or apply
/// the size means the controlling terminal is gone and ends the session.
pub struct ResizeWatcher<'scope> {
    handle: Handle,
    thread: Option<ScopedJoinHandle<'scope, ()>>,
}

impl<'scope> ResizeWatcher<'scope> {
    pub fn start<'env>(
        scope: &'scope Scope<'scope, 'env>,
        propagator: ResizePropagator<'env>,
        shutdown: ShutdownHandle,
    ) -> Result<Self, PtyError> {
        let mut signals =
            Signals::new([SIGWINCH]).map_err(|source| PtyError::SignalHandlers { source })?;
        let handle = signals.handle();
        let thread = scope.spawn(move || {
            for _ in signals.forever() {
                match propagator.propagate() {
                    Ok(size) => {
                        debug!(rows = size.rows, cols = size.cols, "Window size propagated");
                    }
                    Err(err) => {
                        error!("Resize propagation failed: {err}");
                        shutdown.signal(EndReason::Fault(format!(
                            "resize propagation failed: {err}"
                        )));
                        break;
                    }
                }
            }
        });
        debug!("Resize propagator armed");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn stop(mut self) {
        self.disarm();
    }

    fn disarm(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Resize watcher thread panicked");
            }
            debug!("Resize propagator disarmed");
        }
    }
}

impl Drop for ResizeWatcher<'_> {
    fn drop(&mut self) {
        self.disarm();
    }
}
