//! One image, one REPL session, three turns.
//!
//! ```text
//! Idle -> Starting -> AwaitingBanner -> TurnSent(description) -> TurnReceived(description)
//!      -> TurnSent(keywords) -> TurnReceived(keywords) -> TurnSent(ocr) -> TurnReceived(ocr)
//!      -> Closed
//! ```
//!
//! A turn's prompt is only written after the previous read has seen the
//! marker or timed out. A timed-out read is kept as partial text and the
//! protocol moves on. A closed peer or failed write jumps straight to
//! `Closed` with a `SessionError::Io` carrying the turns captured so far.
//!
//! Teardown (controller closed, child terminated) runs on every path out of
//! `Session::run`.

use crate::error::SessionError;
use crate::poller::MarkerPoller;
use crate::pty_channel::{self, PtyChannel};
use crate::supervisor::{self, ProcessHandle};
use imagedesc_core::{ReadEnd, SessionConfig, Transcript, Turn, TurnKind, Verbosity};
use std::fmt;
use std::io;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Where a session is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    AwaitingBanner,
    TurnSent(TurnKind),
    TurnReceived(TurnKind),
    Closed,
}

impl SessionState {
    /// The next state on the happy path.
    pub fn next(self) -> SessionState {
        match self {
            SessionState::Idle => SessionState::Starting,
            SessionState::Starting => SessionState::AwaitingBanner,
            SessionState::AwaitingBanner => SessionState::TurnSent(TurnKind::Description),
            SessionState::TurnSent(kind) => SessionState::TurnReceived(kind),
            SessionState::TurnReceived(kind) => match kind.next() {
                Some(next) => SessionState::TurnSent(next),
                None => SessionState::Closed,
            },
            SessionState::Closed => SessionState::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Starting => f.write_str("starting"),
            SessionState::AwaitingBanner => f.write_str("awaiting banner"),
            SessionState::TurnSent(kind) => write!(f, "waiting for turn {} ({kind})", kind.number()),
            SessionState::TurnReceived(kind) => {
                write!(f, "received turn {} ({kind})", kind.number())
            }
            SessionState::Closed => f.write_str("closed"),
        }
    }
}

/// Drives the REPL for a single image.
///
/// Not reusable: `run` consumes the session.
pub struct Session {
    config: SessionConfig,
    image_path: String,
    state: SessionState,
    transcript: Transcript,
    progress: Option<watch::Sender<SessionState>>,
}

impl Session {
    /// Creates a session for the image at `image_path`.
    ///
    /// The path is passed to the REPL as text; it is never opened here.
    pub fn new(config: SessionConfig, image_path: impl Into<String>) -> Self {
        Self {
            config,
            image_path: image_path.into(),
            state: SessionState::Idle,
            transcript: Transcript::new(),
            progress: None,
        }
    }

    /// Publishes every state transition on `tx`.
    pub fn with_progress(mut self, tx: watch::Sender<SessionState>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the whole protocol and returns the raw transcript.
    ///
    /// A transcript returned as `Ok` may still be degraded (see
    /// `Transcript::is_degraded`) if some read timed out.
    pub async fn run(mut self) -> Result<Transcript, SessionError> {
        self.advance();

        let (mut channel, peer) = match pty_channel::open(self.config.cols, self.config.rows) {
            Ok(pair) => pair,
            Err(e) => {
                self.close_state();
                return Err(e.into());
            }
        };

        let mut process = match supervisor::launch(&self.config, peer) {
            Ok(process) => process,
            Err(e) => {
                channel.close();
                self.close_state();
                return Err(e.into());
            }
        };

        let driven = self.drive(&mut channel).await;
        let failed_in = self.state;

        self.teardown(channel, &mut process).await;

        match driven {
            Ok(()) => Ok(self.transcript),
            Err(source) => Err(SessionError::Io {
                state: failed_in,
                source,
                partial: self.transcript,
            }),
        }
    }

    async fn drive(&mut self, channel: &mut PtyChannel) -> io::Result<()> {
        let poller = MarkerPoller::new(self.config.poll_interval, self.config.chunk_size)
            .with_chunk_echo(self.config.verbosity.echoes_chunks());
        let marker = self.config.marker.clone();

        self.advance();
        let banner = poller
            .read_until_marker(channel.reader(), &marker, self.config.banner_timeout)
            .await;
        let banner_end = banner.end;
        match banner_end {
            ReadEnd::Marker => debug!("REPL is ready"),
            ReadEnd::TimedOut => warn!(
                timeout_secs = self.config.banner_timeout.as_secs_f64(),
                "No ready banner before timeout, sending the first prompt anyway"
            ),
            ReadEnd::Closed => return Err(banner.into_error()),
        }

        while let SessionState::TurnSent(kind) = self.state.next() {
            let prompt = self.config.prompts.render(kind, &self.image_path);
            self.advance();
            channel
                .send(
                    prompt.as_bytes(),
                    self.config.write_timeout,
                    self.config.poll_interval,
                )
                .await?;

            let outcome = poller
                .read_until_marker(channel.reader(), &marker, self.config.read_timeout)
                .await;
            let end = outcome.end;
            let bytes = outcome.text.len();

            if end == ReadEnd::Closed {
                warn!(turn = %kind, bytes, "REPL closed mid-turn");
                let error = outcome.error;
                self.transcript.push(Turn::new(kind, prompt, outcome.text, end));
                return Err(error.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "PTY peer closed")
                }));
            }

            self.transcript.push(Turn::new(kind, prompt, outcome.text, end));
            self.advance();

            if end == ReadEnd::TimedOut {
                warn!(
                    turn = %kind,
                    bytes,
                    timeout_secs = self.config.read_timeout.as_secs_f64(),
                    "No marker before timeout, keeping partial response (degraded)"
                );
            } else if self.config.verbosity == Verbosity::Quiet {
                debug!(turn = %kind, bytes, "Turn complete");
            } else {
                info!(turn = %kind, bytes, "Turn complete");
            }
        }

        Ok(())
    }

    async fn teardown(&mut self, channel: PtyChannel, process: &mut ProcessHandle) {
        channel.close();
        if let Err(e) = process.terminate(self.config.terminate_grace).await {
            warn!(error = %e, pid = ?process.pid(), "Failed to terminate REPL");
        }
        self.close_state();
    }

    fn advance(&mut self) {
        self.set_state(self.state.next());
    }

    fn close_state(&mut self) {
        self.set_state(SessionState::Closed);
    }

    fn set_state(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "Session transition");
        self.state = next;
        if let Some(tx) = &self.progress {
            let _ = tx.send(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_visits_every_state_in_order() {
        let mut state = SessionState::Idle;
        let mut visited = vec![state];
        while state != SessionState::Closed {
            state = state.next();
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![
                SessionState::Idle,
                SessionState::Starting,
                SessionState::AwaitingBanner,
                SessionState::TurnSent(TurnKind::Description),
                SessionState::TurnReceived(TurnKind::Description),
                SessionState::TurnSent(TurnKind::Keywords),
                SessionState::TurnReceived(TurnKind::Keywords),
                SessionState::TurnSent(TurnKind::Ocr),
                SessionState::TurnReceived(TurnKind::Ocr),
                SessionState::Closed,
            ]
        );
    }

    #[test]
    fn test_closed_is_terminal() {
        assert_eq!(SessionState::Closed.next(), SessionState::Closed);
    }

    #[test]
    fn test_state_display_names_turn() {
        assert_eq!(
            SessionState::TurnSent(TurnKind::Keywords).to_string(),
            "waiting for turn 2 (keywords)"
        );
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = Session::new(SessionConfig::default(), "/tmp/x.jpg");
        assert_eq!(session.state(), SessionState::Idle);
    }
}
