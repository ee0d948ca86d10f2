//! Recovers the model's answer from raw terminal output.
//!
//! The REPL paints spinners, redraws lines, echoes continuation prompts and
//! reprints its banner after every answer. The pipeline below strips those
//! artifacts in a fixed order; each step assumes the previous ones ran.
//!
//! 1. terminal escape sequences
//! 2. carriage returns
//! 3. anything outside 7-bit ASCII (spinner glyphs)
//! 4. a leading "thinking" preamble, up to the last `X... ` line
//! 5. the trailing banner, from the first `\n>>>` on
//! 6. a leading "Added image ..." line
//! 7. surrounding whitespace
//! 8. OCR only: a "none" answer becomes empty, quotes are dropped
//!
//! Steps 4 and 5 are heuristics. An answer that itself contains an
//! ellipsis-prefixed line will lose everything before it, so both steps log
//! when they fire.
//!
//! Sanitizing never fails; text that matches none of the expected shapes
//! just passes through.

use crate::config::DEFAULT_MARKER;
use crate::turn::TurnKind;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// `ESC` followed by a single Fe byte, or a full CSI sequence.
static TERMINAL_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid escape pattern")
});

/// A line that starts with one non-word marker character followed by an
/// ellipsis, e.g. the REPL's `... ` continuation prompt.
static PREAMBLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\w\s]\.{2,3} [^\n]*$").expect("valid preamble pattern")
});

/// Prefix of the line the REPL prints when it loads the image.
const ATTACHED_IMAGE_PREFIX: &str = "Added image";

/// Sanitizer configured with the REPL's completion marker.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    marker: String,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl Sanitizer {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Runs the full pipeline over one raw response.
    pub fn sanitize(&self, raw: &str, kind: TurnKind) -> String {
        let text = strip_terminal_codes(raw);
        let text = strip_carriage_returns(&text);
        let text = strip_non_ascii(&text);
        let text = strip_thinking(&text);
        let text = strip_banner(text, &self.marker);
        let text = strip_attached_image_line(text);
        let text = text.trim();

        if kind == TurnKind::Ocr {
            normalize_ocr(text)
        } else {
            text.to_string()
        }
    }
}

/// Removes CSI sequences and two-character escapes. Other control
/// characters, tabs included, are left alone.
pub fn strip_terminal_codes(text: &str) -> String {
    TERMINAL_CODE.replace_all(text, "").into_owned()
}

pub fn strip_carriage_returns(text: &str) -> String {
    text.replace('\r', "")
}

pub fn strip_non_ascii(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

/// Keeps only the text after the last preamble line, if there is one.
pub fn strip_thinking(text: &str) -> &str {
    match PREAMBLE_LINE.find_iter(text).last() {
        Some(line) => {
            debug!(
                preamble_bytes = line.end(),
                "Stripped thinking preamble from response"
            );
            &text[line.end()..]
        }
        None => text,
    }
}

/// Cuts everything from the first line that starts with `marker`.
pub fn strip_banner<'a>(text: &'a str, marker: &str) -> &'a str {
    let needle = format!("\n{marker}");
    match text.find(&needle) {
        Some(idx) => {
            debug!(
                dropped_bytes = text.len() - idx,
                "Stripped trailing banner from response"
            );
            &text[..idx]
        }
        None => text,
    }
}

/// Drops a first line announcing that an image was attached.
pub fn strip_attached_image_line(text: &str) -> &str {
    let leading = text.trim_start();
    if !leading.starts_with(ATTACHED_IMAGE_PREFIX) {
        return text;
    }
    debug!("Dropped attached-image line from response");
    match leading.find('\n') {
        Some(idx) => &leading[idx + 1..],
        None => "",
    }
}

/// Maps a "none" answer to the empty string and strips double quotes.
pub fn normalize_ocr(text: &str) -> String {
    if text.to_ascii_lowercase().starts_with("none") {
        debug!("OCR response reports no text");
        return String::new();
    }
    text.replace('"', "").trim().to_string()
}
