//! # imagedesc
//!
//! Describes images with a local multimodal model and stores the results as
//! XMP metadata:
//! - HEIC/HEIF input is converted to JPEG first (`normalize`)
//! - `ollama run <model>` is driven through a PTY for three prompts per image
//! - the sanitized description, keywords and on-image text are printed as an
//!   exiftool command, or written with `--write` (`metadata`)

mod metadata;
mod normalize;
mod progress;

use anyhow::{Result, bail};
use clap::Parser;
use futures::StreamExt;
use imagedesc_adapters::{Session, SessionError, SessionState};
use imagedesc_core::{ResponseFields, Sanitizer, SessionConfig, Verbosity};
use normalize::Converter;
use progress::Progress;
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "imagedesc", version, about)]
struct Cli {
    /// Image files to describe
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Write the metadata (otherwise only print the exiftool command)
    #[arg(long)]
    write: bool,

    /// Keep the original file; exiftool saves the update next to it
    #[arg(long)]
    preserve: bool,

    /// Debug output, including every raw chunk read from the model
    #[arg(short, long)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Print the extracted fields as one JSON object per image
    #[arg(long)]
    json: bool,

    /// Model passed to `ollama run`
    #[arg(long, env = "IMAGEDESC_MODEL", default_value = "llava")]
    model: String,

    /// Path to the ollama executable
    #[arg(long, env = "IMAGEDESC_OLLAMA_BIN", default_value = "ollama")]
    ollama_bin: String,

    /// Seconds to wait for each answer before keeping what arrived
    #[arg(long, default_value_t = 300)]
    read_timeout_secs: u64,

    /// Seconds to wait for the model to load
    #[arg(long, default_value_t = 120)]
    banner_timeout_secs: u64,

    /// Milliseconds between reads while the model is quiet
    #[arg(long, default_value_t = 50)]
    poll_interval_ms: u64,

    /// Tool used to convert HEIC/HEIF images (defaults to sips on macOS, magick elsewhere)
    #[arg(long, value_enum)]
    converter: Option<Converter>,

    /// Number of images processed at once
    #[arg(
        short,
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    jobs: u16,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::ollama(self.model.clone())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_read_timeout(Duration::from_secs(self.read_timeout_secs))
            .with_banner_timeout(Duration::from_secs(self.banner_timeout_secs))
            .with_verbosity(self.verbosity());
        config.program.clone_from(&self.ollama_bin);
        config
    }
}

/// What gets printed with `--json`.
#[derive(Debug, Serialize)]
struct ImageReport<'a> {
    path: &'a Path,
    #[serde(flatten)]
    fields: &'a ResponseFields,
    degraded: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let progress = Progress::new(cli.verbosity() == Verbosity::Normal);
    init_logging(cli.verbosity(), &progress);

    if cli.write && !command_exists("exiftool") {
        bail!("exiftool not found on PATH; install it or run without --write");
    }

    let config = cli.session_config();
    let converter = cli.converter.unwrap_or_else(Converter::platform_default);
    debug!(command = %config.command_line(), ?converter, jobs = cli.jobs, "Starting");

    let (cli, config, progress) = (&cli, &config, &progress);
    let codes: Vec<i32> = futures::stream::iter(&cli.files)
        .map(|path| async move {
            match describe(cli, config.clone(), converter, progress, path).await {
                Ok(code) => code,
                Err(e) => {
                    error!(path = %path.display(), "{e:#}");
                    1
                }
            }
        })
        .buffer_unordered(usize::from(cli.jobs))
        .collect()
        .await;

    let exit_code = codes.into_iter().find(|code| *code != 0).unwrap_or(0);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Logs go to stderr so stdout stays clean for the exiftool command and JSON.
/// Lines are written between spinner redraws.
fn init_logging(verbosity: Verbosity, progress: &Progress) {
    let filter = match verbosity {
        Verbosity::Quiet => "warn",
        Verbosity::Normal => "info",
        Verbosity::Debug => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let writer = progress.log_writer();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(move || writer.clone())
        .init();
}

/// Runs the whole pipeline for one image and returns its exit code.
async fn describe(
    cli: &Cli,
    config: SessionConfig,
    converter: Converter,
    progress: &Progress,
    path: &Path,
) -> Result<i32> {
    if !path.is_file() {
        bail!("not a file");
    }

    let image = normalize::normalize(path, converter).await?;
    let sanitizer = Sanitizer::new(config.marker.clone());

    let (tx, rx) = watch::channel(SessionState::Idle);
    let spinner = progress.track(path.display().to_string(), rx);
    info!(path = %path.display(), converted = image.was_converted(), "Describing image");

    let result = Session::new(config, image.path().to_string_lossy())
        .with_progress(tx)
        .run()
        .await;
    if let Some(spinner) = spinner {
        let _ = spinner.await;
    }
    // The converted copy is only needed while the model reads it.
    drop(image);

    let transcript = match result {
        Ok(transcript) => transcript,
        Err(e) => {
            if let SessionError::Io { partial, .. } = &e {
                let fields = ResponseFields::from_transcript(partial, &sanitizer);
                debug!(?fields, "Fields recovered before the session failed");
            }
            return Err(e.into());
        }
    };

    let fields = ResponseFields::from_transcript(&transcript, &sanitizer);
    let degraded = transcript.is_degraded();
    if degraded {
        warn!(path = %path.display(), "Some answers timed out; fields may be incomplete");
    }
    if fields.is_empty() {
        warn!(path = %path.display(), "Model returned nothing usable");
    }

    if cli.json {
        let report = ImageReport {
            path,
            fields: &fields,
            degraded,
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    let args = metadata::exiftool_args(&fields, path, cli.preserve);
    if cli.write {
        metadata::write(&args).await
    } else {
        println!("{}", metadata::dry_run_message(&args));
        Ok(1)
    }
}

/// Returns true if `command` resolves to a file, directly or through PATH.
fn command_exists(command: &str) -> bool {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file();
    }
    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };
    let file_name = if cfg!(windows) {
        format!("{command}.exe")
    } else {
        command.to_string()
    };
    env::split_paths(&path_var).any(|dir| dir.join(&file_name).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["imagedesc", "a.jpg"]).expect("parse");
        assert!(!cli.write);
        assert!(!cli.preserve);
        assert_eq!(cli.jobs, 1);
        assert_eq!(cli.verbosity(), Verbosity::Normal);

        let config = cli.session_config();
        assert_eq!(config.read_timeout, Duration::from_secs(300));
        assert_eq!(config.banner_timeout, Duration::from_secs(120));
        assert_eq!(config.args, vec!["run".to_string(), cli.model.clone()]);
    }

    #[test]
    fn test_ollama_bin_replaces_program_only() {
        let cli = Cli::try_parse_from([
            "imagedesc",
            "--ollama-bin",
            "/opt/ollama",
            "--model",
            "bakllava",
            "a.jpg",
        ])
        .expect("parse");
        let config = cli.session_config();
        assert_eq!(config.program, "/opt/ollama");
        assert_eq!(config.args, vec!["run", "bakllava"]);
    }

    #[test]
    fn test_files_required() {
        assert!(Cli::try_parse_from(["imagedesc"]).is_err());
    }

    #[test]
    fn test_jobs_must_be_positive() {
        assert!(Cli::try_parse_from(["imagedesc", "--jobs", "0", "a.jpg"]).is_err());
    }

    #[test]
    fn test_debug_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["imagedesc", "-d", "-q", "a.jpg"]).is_err());
    }

    #[test]
    fn test_command_exists() {
        assert!(!command_exists("imagedesc-test-no-such-program"));
        assert!(!command_exists("/nonexistent/imagedesc"));
    }
}
