//! Spinner showing which turn each image's session is waiting on.

use imagedesc_adapters::SessionState;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::{self, IsTerminal, Write, stderr};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spinners for all sessions in flight. Disabled when stderr is not a
/// terminal or chunk echo would interleave with them.
pub struct Progress {
    bars: Option<MultiProgress>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        let bars = (enabled && stderr().is_terminal()).then(MultiProgress::new);
        Self { bars }
    }

    /// Writer for log output that clears the spinners while a line is
    /// printed, then redraws them below it.
    pub fn log_writer(&self) -> LogWriter {
        LogWriter {
            bars: self.bars.clone(),
        }
    }

    /// Follows `rx` until the session drops its sender.
    ///
    /// Returns `None` when spinners are disabled.
    pub fn track(
        &self,
        label: String,
        mut rx: watch::Receiver<SessionState>,
    ) -> Option<JoinHandle<()>> {
        let bars = self.bars.as_ref()?;

        let spinner = bars.add(ProgressBar::new_spinner());
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("{label}: {}", *rx.borrow()));
        spinner.enable_steady_tick(Duration::from_millis(100));

        Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                spinner.set_message(format!("{label}: {state}"));
            }
            spinner.finish_and_clear();
        }))
    }
}

/// Stderr writer that stays out of the spinners' way.
#[derive(Clone)]
pub struct LogWriter {
    bars: Option<MultiProgress>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.bars {
            Some(bars) => bars.suspend(|| stderr().write(buf)),
            None => stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        stderr().flush()
    }
}
