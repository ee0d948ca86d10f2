//! Writing the recovered fields back into the image with exiftool.

use anyhow::{Context, Result};
use imagedesc_core::ResponseFields;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error};

const EXIFTOOL: &str = "exiftool";

/// Builds the exiftool argument list for `target`.
///
/// Each tag value is a separate argv entry, so no shell quoting is involved.
/// `OCRText` is only written when there is text to write.
pub fn exiftool_args(fields: &ResponseFields, target: &Path, preserve: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(fields.keywords.len() + 4);
    if !preserve {
        args.push("-overwrite_original".into());
    }
    args.push(format!("-XMP:Description={}", fields.description.replace('"', "")).into());
    for keyword in &fields.keywords {
        args.push(format!("-XMP:Subject={keyword}").into());
    }
    if !fields.ocr_text.is_empty() {
        args.push(format!("-XMP:OCRText={}", fields.ocr_text).into());
    }
    args.push(target.into());
    args
}

/// The line printed instead of writing when `--write` is not given.
pub fn dry_run_message(args: &[OsString]) -> String {
    let shown: Vec<String> = args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    format!("Use --write to save: {shown:?}")
}

/// Runs exiftool with `args`, echoing its output, and returns its exit code.
pub async fn write(args: &[OsString]) -> Result<i32> {
    debug!(?args, "Running exiftool");
    let output = Command::new(EXIFTOOL)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run {EXIFTOOL}"))?;

    let code = output.status.code().unwrap_or(1);
    if output.status.success() {
        print!("{}", String::from_utf8_lossy(&output.stdout));
    } else {
        error!(exit_code = code, "{EXIFTOOL} failed");
        eprint!("{}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(description: &str, keywords: &[&str], ocr_text: &str) -> ResponseFields {
        ResponseFields {
            description: description.to_string(),
            keywords: keywords.iter().map(ToString::to_string).collect(),
            ocr_text: ocr_text.to_string(),
        }
    }

    #[test]
    fn test_args_in_order() {
        let args = exiftool_args(
            &fields("A red car.", &["car", "red"], "STOP"),
            Path::new("/photos/IMG_1.heic"),
            false,
        );
        assert_eq!(
            args,
            vec![
                "-overwrite_original",
                "-XMP:Description=A red car.",
                "-XMP:Subject=car",
                "-XMP:Subject=red",
                "-XMP:OCRText=STOP",
                "/photos/IMG_1.heic",
            ]
        );
    }

    #[test]
    fn test_preserve_keeps_original() {
        let args = exiftool_args(&fields("x", &[], ""), Path::new("a.jpg"), true);
        assert_eq!(args, vec!["-XMP:Description=x", "a.jpg"]);
    }

    #[test]
    fn test_empty_ocr_text_is_not_written() {
        let args = exiftool_args(&fields("x", &["k"], ""), Path::new("a.jpg"), false);
        assert!(
            !args
                .iter()
                .any(|a| a.to_string_lossy().starts_with("-XMP:OCRText"))
        );
    }

    #[test]
    fn test_description_quotes_removed() {
        let args = exiftool_args(
            &fields(r#"A sign reading "OPEN"."#, &[], ""),
            Path::new("a.jpg"),
            true,
        );
        assert_eq!(args[0], "-XMP:Description=A sign reading OPEN.");
    }

    #[test]
    fn test_dry_run_message_lists_args() {
        let args = exiftool_args(&fields("x", &["k"], ""), Path::new("a.jpg"), false);
        assert_eq!(
            dry_run_message(&args),
            r#"Use --write to save: ["-overwrite_original", "-XMP:Description=x", "-XMP:Subject=k", "a.jpg"]"#
        );
    }
}
