//! Launching and tearing down the driven program.
//!
//! The child gets the PTY peer end as stdin, stdout and stderr; the
//! supervisor's own copy of the peer is dropped right after spawn so the
//! controller sees EOF once the child exits.
//!
//! Termination is SIGTERM, a bounded grace period polling `try_wait`, then
//! SIGKILL. A handle that is dropped without being reaped kills the child so
//! no exit path leaves an orphan behind.

use crate::error::LaunchError;
use crate::pty_channel::PtyPeer;
use imagedesc_core::SessionConfig;
#[cfg(unix)]
use nix::sys::signal::{Signal, kill};
#[cfg(unix)]
use nix::unistd::Pid;
#[cfg(not(unix))]
use portable_pty::ChildKiller;
use portable_pty::{Child, CommandBuilder};
use std::io;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Running child process attached to a PTY.
pub struct ProcessHandle {
    child: Box<dyn Child + Send>,
    command: String,
    reaped: bool,
}

/// Starts `config.program` with its standard streams on `peer`.
pub fn launch(config: &SessionConfig, peer: PtyPeer) -> Result<ProcessHandle, LaunchError> {
    let command = config.command_line();

    let mut builder = CommandBuilder::new(&config.program);
    builder.args(&config.args);
    builder.cwd(&config.working_dir);
    builder.env("TERM", "xterm-256color");

    let spawned = peer.slave.spawn_command(builder);
    // The child holds its own copy of the peer end now.
    peer.close();

    let child = spawned.map_err(|e| LaunchError {
        command: command.clone(),
        reason: e.to_string(),
    })?;

    debug!(command = %command, pid = ?child.process_id(), "Launched child in PTY");

    Ok(ProcessHandle {
        child,
        command,
        reaped: false,
    })
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Returns true if the child has exited (and reaps it).
    pub fn has_exited(&mut self) -> io::Result<bool> {
        if self.reaped {
            return Ok(true);
        }
        match self.child.try_wait()? {
            Some(status) => {
                debug!(command = %self.command, exit_code = status.exit_code(), "Child exited");
                self.reaped = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stops the child without waiting on it indefinitely.
    #[cfg(unix)]
    pub async fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        if self.has_exited()? {
            return Ok(());
        }
        let pid = match self.child.process_id() {
            Some(id) => Pid::from_raw(id as i32),
            None => return Ok(()),
        };

        debug!(pid = %pid, "Sending SIGTERM");
        let _ = kill(pid, Signal::SIGTERM);
        if self.wait_for_exit(grace).await? {
            return Ok(());
        }

        debug!(pid = %pid, "Grace period expired, sending SIGKILL");
        let _ = kill(pid, Signal::SIGKILL);
        if !self.wait_for_exit(grace).await? {
            warn!(pid = %pid, command = %self.command, "Child did not exit after SIGKILL");
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn terminate(&mut self, _grace: Duration) -> io::Result<()> {
        if self.has_exited()? {
            return Ok(());
        }
        self.child.kill()?;
        self.has_exited().map(|_| ())
    }

    async fn wait_for_exit(&mut self, max_wait: Duration) -> io::Result<bool> {
        let start = Instant::now();
        loop {
            if self.has_exited()? {
                return Ok(true);
            }
            if start.elapsed() >= max_wait {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        warn!(command = %self.command, "Killing child left running at teardown");
        #[cfg(unix)]
        if let Some(id) = self.child.process_id() {
            let _ = kill(Pid::from_raw(id as i32), Signal::SIGKILL);
        }
        #[cfg(not(unix))]
        let _ = self.child.kill();
        let _ = self.child.try_wait();
    }
}
