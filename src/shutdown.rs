//! Session-end signalling.
//!
//! Whichever party first observes the end of the session (a pump hitting
//! end-of-stream, a termination signal, a resize fault) records why and wakes
//! everyone else through a self-pipe that the pumps include in their
//! readiness wait.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{Scope, ScopedJoinHandle};

use parking_lot::Mutex;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, error, info, warn};

use crate::fd::pipe;

/// Why the session ended. Only the first reason reported is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The outer terminal's input reached end-of-stream.
    InputClosed,
    /// The PTY master reached end-of-stream: the shell exited.
    OutputClosed,
    /// The proxy received a termination signal.
    Terminated(i32),
    /// An unrecoverable fault in a pump or watcher.
    Fault(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownPhase {
    Running = 0,
    Signaled = 1,
    StoppingPumps = 2,
    ReapingChild = 3,
    Restoring = 4,
    Complete = 5,
}

struct Shared {
    shutdown: AtomicBool,
    phase: AtomicU8,
    reason: Mutex<Option<EndReason>>,
    wake_rx: File,
    wake_tx: File,
}

impl Shared {
    fn signal(&self, reason: EndReason) {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return;
            }
            info!(?reason, "Session end signaled");
            *slot = Some(reason);
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.phase
            .store(ShutdownPhase::Signaled as u8, Ordering::SeqCst);
        // The byte is never drained, so the read end stays readable for
        // every waiter from now on.
        if let Err(err) = (&self.wake_tx).write_all(&[1]) {
            warn!("Failed to wake session waiters: {err}");
        }
    }
}

pub struct ShutdownCoordinator {
    shared: Arc<Shared>,
}

impl ShutdownCoordinator {
    pub fn new() -> io::Result<Self> {
        let (wake_rx, wake_tx) = pipe()?;
        Ok(Self {
            shared: Arc::new(Shared {
                shutdown: AtomicBool::new(false),
                phase: AtomicU8::new(ShutdownPhase::Running as u8),
                reason: Mutex::new(None),
                wake_rx,
                wake_tx,
            }),
        })
    }

    pub fn signal(&self, reason: EndReason) {
        self.shared.signal(reason);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<EndReason> {
        self.shared.reason.lock().clone()
    }

    pub fn phase(&self) -> ShutdownPhase {
        match self.shared.phase.load(Ordering::SeqCst) {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Signaled,
            2 => ShutdownPhase::StoppingPumps,
            3 => ShutdownPhase::ReapingChild,
            4 => ShutdownPhase::Restoring,
            _ => ShutdownPhase::Complete,
        }
    }

    pub fn advance(&self, phase: ShutdownPhase) {
        self.shared.phase.store(phase as u8, Ordering::SeqCst);
        debug!("Shutdown phase: {:?}", phase);
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Cloneable handle given to pumps and watchers.
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl ShutdownHandle {
    pub fn signal(&self, reason: EndReason) {
        self.shared.signal(reason);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Descriptor that becomes readable once the session end is signaled.
    pub fn wake_fd(&self) -> BorrowedFd<'_> {
        self.shared.wake_rx.as_fd()
    }
}

/// Turns SIGTERM, SIGHUP, SIGINT and SIGQUIT aimed at the proxy into an
/// orderly session end, so the terminal is restored on those paths too.
///
/// signal-hook keeps its handler installed after the watcher is stopped;
/// later signals are dropped instead of taking the default action.
pub struct TerminationWatcher<'scope> {
    handle: Handle,
    thread: Option<ScopedJoinHandle<'scope, ()>>,
}

impl<'scope> TerminationWatcher<'scope> {
    pub fn start<'env>(
        scope: &'scope Scope<'scope, 'env>,
        shutdown: ShutdownHandle,
    ) -> io::Result<Self> {
        let mut signals = Signals::new([SIGTERM, SIGHUP, SIGINT, SIGQUIT])?;
        let handle = signals.handle();
        let thread = scope.spawn(move || {
            if let Some(signal) = signals.forever().next() {
                shutdown.signal(EndReason::Terminated(signal));
            }
        });
        debug!("Termination signals armed");
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
                error!("Termination watcher thread panicked");
            }
            debug!("Termination signals disarmed");
        }
    }
}

impl Drop for TerminationWatcher<'_> {
    fn drop(&mut self) {
        self.disarm();
    }
}
