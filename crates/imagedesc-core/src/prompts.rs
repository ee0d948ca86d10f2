//! The fixed three-turn prompt protocol.
//!
//! Turn 1 asks for a description of the image at a path, Turn 2 asks for
//! keywords derived from that description, Turn 3 asks for any visible text.
//! The wording is part of the contract: changing it changes what the model
//! answers, so the defaults are kept byte-for-byte stable.

use crate::turn::TurnKind;
use std::borrow::Cow;

/// Turn 1 template. The quoted image path is appended directly after it.
pub const DESCRIPTION_PROMPT: &str = "Please generate a concise but detailed description for this image. Ensure the description meticulously covers all visible elements. Include details of any text, objects, people, colors, textures, and spatial relationships. Highlight contrasts, interactions, and any notable features that stand out. Avoid assumptions and focus only on what is clearly observable in the image ";

/// Turn 2 template.
pub const KEYWORDS_PROMPT: &str = "given the description provide a comma separated list of keywords from the description but do not describe the description itself";

/// Turn 3 template.
pub const OCR_PROMPT: &str = "extract all text from the image say none if no text present";

/// Prompt templates for the three turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub description: String,
    pub keywords: String,
    pub ocr: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            description: DESCRIPTION_PROMPT.to_string(),
            keywords: KEYWORDS_PROMPT.to_string(),
            ocr: OCR_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Renders the line written to the REPL for `kind`, newline included.
    ///
    /// Only the description turn references the image; the follow-ups refer
    /// back to the conversation.
    pub fn render(&self, kind: TurnKind, image_path: &str) -> String {
        match kind {
            TurnKind::Description => {
                format!("{}{}\n", self.description, quote_path(image_path))
            }
            TurnKind::Keywords => format!("{}\n", self.keywords),
            TurnKind::Ocr => format!("{}\n", self.ocr),
        }
    }
}

/// Quotes `path` so the REPL sees it as one literal token inside free text.
///
/// Paths made only of shell-safe characters come back unchanged.
pub fn quote_path(path: &str) -> Cow<'_, str> {
    if path.contains('\0') {
        let cleaned = path.replace('\0', "");
        return match shlex::try_quote(&cleaned) {
            Ok(quoted) => Cow::Owned(quoted.into_owned()),
            Err(_) => Cow::Owned(cleaned),
        };
    }
    shlex::try_quote(path).unwrap_or(Cow::Borrowed(path))
}
