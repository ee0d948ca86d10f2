//! Pseudo-terminal allocation.
//!
//! The controller end stays with the session and is switched to
//! non-blocking mode, so a read with nothing pending returns
//! `ErrorKind::WouldBlock` instead of parking the task. The peer end is
//! handed to the supervisor, which gives it to the child and drops its own
//! copy.
//!
//! Descriptors are released by dropping: `PtyChannel::close` consumes the
//! channel, so each end can only be closed once.

use crate::error::PtyError;
use portable_pty::{MasterPty, PtySize, SlavePty, native_pty_system};
use std::io::{self, Read, Write};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Controller side of a PTY pair.
pub struct PtyChannel {
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    // Kept alive so the pair stays open until `close`.
    _master: Box<dyn MasterPty + Send>,
}

/// Peer side of a PTY pair, destined for the child's standard streams.
pub struct PtyPeer {
    pub(crate) slave: Box<dyn SlavePty + Send>,
}

/// Allocates a PTY pair and puts the controller end in non-blocking mode.
pub fn open(cols: u16, rows: u16) -> Result<(PtyChannel, PtyPeer), PtyError> {
    let pair = native_pty_system()
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| PtyError::Allocation(e.to_string()))?;

    set_nonblocking(pair.master.as_ref())?;

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| PtyError::Reader(e.to_string()))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| PtyError::Writer(e.to_string()))?;

    debug!(cols, rows, "Allocated PTY pair");

    Ok((
        PtyChannel {
            reader,
            writer,
            _master: pair.master,
        },
        PtyPeer { slave: pair.slave },
    ))
}

#[cfg(unix)]
fn set_nonblocking(master: &dyn MasterPty) -> Result<(), PtyError> {
    use nix::fcntl::{FcntlArg, OFlag, fcntl};

    let fd = master
        .as_raw_fd()
        .ok_or_else(|| PtyError::NonBlocking("controller has no file descriptor".to_string()))?;
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| PtyError::NonBlocking(e.to_string()))?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| PtyError::NonBlocking(e.to_string()))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_nonblocking(_master: &dyn MasterPty) -> Result<(), PtyError> {
    Err(PtyError::NonBlocking(
        "non-blocking PTY reads require a Unix platform".to_string(),
    ))
}

impl PtyChannel {
    /// Reader over the controller end. Reads never block.
    pub fn reader(&mut self) -> &mut (dyn Read + Send) {
        self.reader.as_mut()
    }

    /// Writes all of `data`, retrying while the terminal buffer is full.
    ///
    /// Fails with `ErrorKind::TimedOut` if the peer stops draining input for
    /// longer than `timeout`.
    pub async fn send(
        &mut self,
        data: &[u8],
        timeout: Duration,
        poll_interval: Duration,
    ) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        let mut written = 0;

        while written < data.len() {
            match self.writer.write(&data[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "PTY accepted no bytes",
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("PTY write stalled after {written} of {} bytes", data.len()),
                        ));
                    }
                    tokio::time::sleep(poll_interval).await;
                }
                Err(e) => return Err(e),
            }
        }

        match self.writer.flush() {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            other => other,
        }
    }

    /// Closes the controller end.
    pub fn close(self) {
        debug!("Closing PTY controller");
        drop(self);
    }
}

impl PtyPeer {
    /// Releases the peer end without handing it to a child.
    pub fn close(self) {
        drop(self);
    }
}
