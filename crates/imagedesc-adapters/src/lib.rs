//! # imagedesc-adapters
//!
//! Drives an interactive multimodal chat REPL through a pseudo-terminal.
//!
//! The REPL has no machine-readable protocol: it prints a banner ending in a
//! marker, takes one line of free text, streams an answer and reprints the
//! marker. This crate provides:
//! - `pty_channel`: PTY allocation with a non-blocking controller end
//! - `poller`: marker-framed reads that never block the caller indefinitely
//! - `supervisor`: launching the REPL on the peer end and tearing it down
//! - `session`: the fixed three-turn protocol as an explicit state machine
//!
//! Each session owns its PTY pair and child process exclusively, so
//! independent sessions can run concurrently without locking.

mod error;
pub mod poller;
pub mod pty_channel;
pub mod session;
pub mod supervisor;

pub use error::{LaunchError, PtyError, SessionError};
pub use poller::{MarkerPoller, ReadOutcome};
pub use pty_channel::{PtyChannel, PtyPeer};
pub use session::{Session, SessionState};
pub use supervisor::ProcessHandle;
