//! Per-session configuration.
//!
//! Every bound the session driver relies on (poll interval, per-read
//! timeouts, termination grace) lives here as an explicit value so tests can
//! run the whole protocol against a scripted REPL with short timeouts.

use crate::prompts::PromptSet;
use std::path::PathBuf;
use std::time::Duration;

/// Marker the driven REPL prints when it is ready for the next line of input.
pub const DEFAULT_MARKER: &str = ">>>";

/// How much of the session is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Warnings and errors only.
    Quiet,
    /// Turn boundaries and degraded reads.
    #[default]
    Normal,
    /// Everything, including each raw chunk read from the terminal.
    Debug,
}

impl Verbosity {
    /// Returns true if raw PTY chunks should be logged.
    pub fn echoes_chunks(self) -> bool {
        self == Verbosity::Debug
    }
}

/// Configuration for one image's session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Program to launch inside the PTY.
    pub program: String,
    /// Arguments passed to `program`.
    pub args: Vec<String>,
    /// Working directory for the launched program.
    /// Captured up front so relative image paths resolve the same way for
    /// the child as they do for the caller.
    pub working_dir: PathBuf,
    /// Completion marker framing each response.
    pub marker: String,
    /// Sleep between non-blocking read attempts that found no data.
    pub poll_interval: Duration,
    /// Upper bound for the ready-banner read (model load can be slow).
    pub banner_timeout: Duration,
    /// Upper bound for each turn's response read.
    pub read_timeout: Duration,
    /// Upper bound for writing one prompt when the terminal pushes back.
    pub write_timeout: Duration,
    /// How long to wait after SIGTERM before escalating to SIGKILL.
    pub terminate_grace: Duration,
    /// Bytes requested per read.
    pub chunk_size: usize,
    /// Terminal width.
    pub cols: u16,
    /// Terminal height.
    pub rows: u16,
    /// Logging level for this session.
    pub verbosity: Verbosity,
    /// The three prompt templates.
    pub prompts: PromptSet,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::ollama("llava")
    }
}

impl SessionConfig {
    /// Configuration driving `ollama run <model>`.
    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            program: "ollama".to_string(),
            args: vec!["run".to_string(), model.into()],
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            marker: DEFAULT_MARKER.to_string(),
            poll_interval: Duration::from_millis(50),
            banner_timeout: Duration::from_secs(120),
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(5),
            terminate_grace: Duration::from_secs(2),
            chunk_size: 4096,
            cols: 80,
            rows: 24,
            verbosity: Verbosity::default(),
            prompts: PromptSet::default(),
        }
    }

    /// Replaces the launched program and its arguments.
    pub fn with_program<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory for the launched program.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the per-turn read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the ready-banner timeout.
    pub fn with_banner_timeout(mut self, timeout: Duration) -> Self {
        self.banner_timeout = timeout;
        self
    }

    /// Sets the SIGTERM grace period.
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Sets the verbosity level.
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Full command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_drives_ollama_llava() {
        let config = SessionConfig::default();
        assert_eq!(config.program, "ollama");
        assert_eq!(config.args, vec!["run", "llava"]);
        assert_eq!(config.marker, ">>>");
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.command_line(), "ollama run llava");
    }

    #[test]
    fn test_with_program_replaces_args() {
        let config = SessionConfig::default().with_program("sh", ["-c", "true"]);
        assert_eq!(config.command_line(), "sh -c true");
    }

    #[test]
    fn test_only_debug_echoes_chunks() {
        assert!(Verbosity::Debug.echoes_chunks());
        assert!(!Verbosity::Normal.echoes_chunks());
        assert!(!Verbosity::Quiet.echoes_chunks());
    }
}
