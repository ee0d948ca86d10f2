//! Image-format normalization before the session runs.
//!
//! The model hallucinates on HEIC/HEIF input, so those files are converted
//! to JPEG first. The converted copy lives in a temp file that is removed
//! once the `NormalizedImage` is dropped; metadata is still written to the
//! original.

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// External tool used to convert unsupported formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Converter {
    /// macOS `sips`
    Sips,
    /// ImageMagick `magick`
    Magick,
}

impl Converter {
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Converter::Sips
        } else {
            Converter::Magick
        }
    }

    /// Program and arguments converting `src` to a JPEG at `dst`.
    pub fn command(self, src: &Path, dst: &Path) -> (&'static str, Vec<OsString>) {
        match self {
            Converter::Sips => (
                "sips",
                vec![
                    "-s".into(),
                    "format".into(),
                    "jpeg".into(),
                    src.into(),
                    "--out".into(),
                    dst.into(),
                ],
            ),
            Converter::Magick => ("magick", vec![src.into(), dst.into()]),
        }
    }
}

/// The path handed to the session, plus the temp file backing it if the
/// source had to be converted.
#[derive(Debug)]
pub struct NormalizedImage {
    path: PathBuf,
    _converted: Option<TempPath>,
}

impl NormalizedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn was_converted(&self) -> bool {
        self._converted.is_some()
    }
}

/// Returns true if `file -b` output names a format the model can't read.
pub fn needs_conversion(file_description: &str) -> bool {
    file_description.contains("HEIF")
}

/// Converts `path` if its detected type needs it, otherwise passes it
/// through unchanged.
pub async fn normalize(path: &Path, converter: Converter) -> Result<NormalizedImage> {
    let passthrough = || NormalizedImage {
        path: path.to_path_buf(),
        _converted: None,
    };

    match detect_type(path).await {
        Some(description) if needs_conversion(&description) => {
            info!(path = %path.display(), detected = %description.trim(), "Converting to JPEG");
            convert(path, converter).await
        }
        Some(description) => {
            debug!(path = %path.display(), detected = %description.trim(), "No conversion needed");
            Ok(passthrough())
        }
        None => Ok(passthrough()),
    }
}

async fn detect_type(path: &Path) -> Option<String> {
    match Command::new("file").arg("-b").arg(path).output().await {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => {
            warn!(
                path = %path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "`file` could not detect the image type, using it as is"
            );
            None
        }
        Err(e) => {
            warn!(error = %e, "`file` is unavailable, skipping format detection");
            None
        }
    }
}

async fn convert(path: &Path, converter: Converter) -> Result<NormalizedImage> {
    // The converter picks the output format from the extension.
    let target = tempfile::Builder::new()
        .prefix("imagedesc-")
        .suffix(".jpg")
        .tempfile()
        .context("Failed to create temp file for converted image")?
        .into_temp_path();

    let (program, args) = converter.command(path, &target);
    let output = Command::new(program)
        .args(&args)
        .output()
        .await
        .with_context(|| format!("Failed to run {program}"))?;

    if !output.status.success() {
        bail!(
            "{program} failed to convert {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(NormalizedImage {
        path: target.to_path_buf(),
        _converted: Some(target),
    })
}
