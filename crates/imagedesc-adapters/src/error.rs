use crate::session::SessionState;
use imagedesc_core::Transcript;
use std::io;
use thiserror::Error;

/// Errors from allocating or preparing the pseudo-terminal.
#[derive(Debug, Error)]
pub enum PtyError {
    /// The OS refused to allocate a PTY pair.
    #[error("openpty failed: {0}")]
    Allocation(String),

    /// The controller end could not be switched to non-blocking mode.
    #[error("failed to set PTY non-blocking: {0}")]
    NonBlocking(String),

    #[error("failed to clone PTY reader: {0}")]
    Reader(String),

    #[error("failed to take PTY writer: {0}")]
    Writer(String),
}

/// The driven program could not be started.
#[derive(Debug, Error)]
#[error("failed to launch `{command}`: {reason}")]
pub struct LaunchError {
    pub command: String,
    pub reason: String,
}

/// Errors that end a session early.
///
/// A read timeout is not one of them: it is recorded on the turn and the
/// session carries on.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No PTY; nothing was launched.
    #[error("failed to allocate pseudo-terminal: {0}")]
    Allocation(#[from] PtyError),

    /// The program is missing or failed to start. The PTY has been released.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// The peer closed or a read/write failed mid-session.
    #[error("session I/O failed while {state}: {source}")]
    Io {
        state: SessionState,
        #[source]
        source: io::Error,
        /// Turns captured before the failure, including the interrupted one.
        partial: Transcript,
    },
}

impl SessionError {
    /// Turns captured before the failure, if the session got that far.
    pub fn partial(&self) -> Option<&Transcript> {
        match self {
            SessionError::Io { partial, .. } => Some(partial),
            _ => None,
        }
    }

    pub fn into_partial(self) -> Option<Transcript> {
        match self {
            SessionError::Io { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
