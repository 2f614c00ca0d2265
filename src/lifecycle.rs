//! One recorded session, start to finish.
//!
//! Order of events:
//!
//! ```text
//! capture mode + size → spawn shell on PTY → arm termination watcher
//!   → raw mode → transcript → arm resize watcher → run pumps until
//!   either ends → stop resize watcher → close transcript
//!   → close master + reap shell → restore mode → stop termination watcher
//! ```
//!
//! Every failure before raw mode is entered leaves the outer terminal
//! untouched; from then on the mode is restored on every path.

use std::io;
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, info_span};

use crate::config::Config;
use crate::fd::NonBlocking;
use crate::pty::{
    self, ExitStatus, PtyError, PtySession, ResizePropagator, ResizeWatcher, SlaveTemplate,
};
use crate::relay::{self, PumpStats, RelayError, Transcript};
use crate::shutdown::{EndReason, ShutdownCoordinator, ShutdownPhase, TerminationWatcher};
use crate::term::{OuterTerminal, RawModeGuard, TermError, TerminalModeSnapshot, WindowSize};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error(transparent)]
    Term(#[from] TermError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Cannot open transcript file '{path}': {source}")]
    Transcript {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot set up session signalling: {source}")]
    Signalling {
        #[source]
        source: io::Error,
    },

    #[error("Cannot switch session descriptors to non-blocking mode: {source}")]
    Descriptor {
        #[source]
        source: io::Error,
    },

    #[error("The {0} pump panicked")]
    PumpPanicked(&'static str),

    #[error("Session aborted: {0}")]
    Fault(String),
}

/// Everything a session needs, resolved up front.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub shell: PathBuf,
    pub transcript: PathBuf,
    pub chunk_size: usize,
    pub max_slave_path: usize,
    pub grace: Duration,
}

impl SessionOptions {
    /// Resolve options from config; the shell is looked up in the current
    /// environment.
    pub fn from_config(config: &Config) -> Self {
        Self {
            shell: config.shell.resolve_from_env(),
            transcript: config.transcript.path.clone(),
            chunk_size: config.relay.chunk_size,
            max_slave_path: config.pty.max_slave_path,
            grace: config.teardown.grace(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reason: EndReason,
    pub status: ExitStatus,
    pub transcript_bytes: u64,
}

impl SessionOutcome {
    /// Process exit code for this session.
    ///
    /// The shell's own status when it ended the session, 0 when the outer
    /// input closed first, `128 + signal` when the proxy was told to stop.
    pub fn exit_code(&self) -> u8 {
        let code = match self.reason {
            EndReason::OutputClosed => self.status.code(),
            EndReason::InputClosed => 0,
            EndReason::Terminated(signal) => 128 + signal,
            EndReason::Fault(_) => 1,
        };
        (code & 0xff) as u8
    }
}

/// Run a complete session on `outer`.
pub fn run(outer: &OuterTerminal, options: &SessionOptions) -> Result<SessionOutcome, SessionError> {
    let snapshot = TerminalModeSnapshot::capture(outer.control())?;
    let size = WindowSize::query(outer.control())?;
    debug!(%size, "Outer terminal captured");

    let coordinator =
        ShutdownCoordinator::new().map_err(|source| SessionError::Signalling { source })?;

    let template = SlaveTemplate {
        mode: Some(snapshot.clone()),
        size: Some(size),
    };
    let session = pty::spawn(&options.shell, &template, options.max_slave_path)?;
    let span = info_span!("session", pid = session.child_pid());
    let _entered = span.enter();
    info!(shell = %options.shell.display(), slave = %session.slave_path().display(), "Shell started");

    // Termination signals are caught from before raw mode until after the
    // restore.
    thread::scope(|scope| -> Result<SessionOutcome, SessionError> {
        // Dropping `session` on this error path hangs up and reaps the shell.
        let termination = TerminationWatcher::start(scope, coordinator.handle())
            .map_err(|source| SessionError::Signalling { source })?;
        let outcome = supervise(session, outer, options, &snapshot, &coordinator);
        termination.stop();
        outcome
    })
}

/// Raw mode, relay, reap, restore.
fn supervise(
    session: PtySession,
    outer: &OuterTerminal,
    options: &SessionOptions,
    snapshot: &TerminalModeSnapshot,
    coordinator: &ShutdownCoordinator,
) -> Result<SessionOutcome, SessionError> {
    let raw = RawModeGuard::enter(outer.control(), snapshot)?;

    let relayed = relay_session(&session, outer, options, coordinator);

    coordinator.advance(ShutdownPhase::ReapingChild);
    let status = session.close(options.grace);

    coordinator.advance(ShutdownPhase::Restoring);
    let restored = raw.restore();
    coordinator.advance(ShutdownPhase::Complete);

    let transcript_bytes = relayed?;
    restored?;
    let status = status?;

    let reason = coordinator.reason().unwrap_or(EndReason::OutputClosed);
    if let EndReason::Fault(message) = reason {
        return Err(SessionError::Fault(message));
    }
    info!(?reason, ?status, transcript_bytes, "Session finished");

    Ok(SessionOutcome {
        reason,
        status,
        transcript_bytes,
    })
}

/// Run the pumps and the resize watcher until the session ends. Returns the
/// number of bytes recorded in the transcript.
fn relay_session(
    session: &PtySession,
    outer: &OuterTerminal,
    options: &SessionOptions,
    coordinator: &ShutdownCoordinator,
) -> Result<u64, SessionError> {
    let mut transcript =
        Transcript::create(&options.transcript).map_err(|source| SessionError::Transcript {
            path: options.transcript.clone(),
            source,
        })?;
    let master = session.master();
    let chunk_size = options.chunk_size;

    // Writes that would block return instead, so the pumps keep watching
    // the wake descriptor while a destination is full.
    let _master_nonblocking = NonBlocking::enable(master.as_fd())
        .map_err(|source| SessionError::Descriptor { source })?;
    let _output_nonblocking = NonBlocking::enable(outer.output().as_fd())
        .map_err(|source| SessionError::Descriptor { source })?;

    let (input, output) = thread::scope(|scope| -> Result<_, SessionError> {
        let propagator = ResizePropagator::new(outer.control(), master.as_fd());
        let resize = ResizeWatcher::start(scope, propagator, coordinator.handle())?;

        let input_handle = coordinator.handle();
        let input = scope.spawn(move || {
            scopeguard::defer_on_unwind! {
                input_handle.signal(EndReason::Fault("input pump panicked".to_string()));
            }
            let result =
                relay::run_input_pump(outer.input(), master, chunk_size, input_handle.wake_fd());
            input_handle.signal(end_reason(&result, EndReason::InputClosed));
            result
        });

        let output_handle = coordinator.handle();
        let transcript = &mut transcript;
        let output = scope.spawn(move || {
            scopeguard::defer_on_unwind! {
                output_handle.signal(EndReason::Fault("output pump panicked".to_string()));
            }
            let result = relay::run_output_pump(
                master,
                outer.output(),
                transcript,
                chunk_size,
                output_handle.wake_fd(),
            );
            output_handle.signal(end_reason(&result, EndReason::OutputClosed));
            result
        });

        let input = input.join();
        let output = output.join();
        coordinator.advance(ShutdownPhase::StoppingPumps);
        resize.stop();

        Ok((
            input.map_err(|_| SessionError::PumpPanicked("input"))?,
            output.map_err(|_| SessionError::PumpPanicked("output"))?,
        ))
    })?;

    let input = input?;
    let output = output?;
    debug!(input = input.bytes, output = output.bytes, "Pumps stopped");

    transcript.close().map_err(|source| SessionError::Transcript {
        path: options.transcript.clone(),
        source,
    })
}

/// The reason a pump reports when it stops. A cancelled pump reports the
/// fallback, which is ignored because another party already signaled.
fn end_reason(result: &Result<PumpStats, RelayError>, end_of_stream: EndReason) -> EndReason {
    match result {
        Ok(_) => end_of_stream,
        Err(err) => EndReason::Fault(err.to_string()),
    }
}
