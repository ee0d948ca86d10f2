//! The three clean fields produced for one image.

use crate::sanitize::Sanitizer;
use crate::turn::{Transcript, TurnKind};
use serde::Serialize;

/// Description, keywords and on-image text recovered from a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseFields {
    pub description: String,
    pub keywords: Vec<String>,
    /// Empty when the model reported no visible text.
    pub ocr_text: String,
}

impl ResponseFields {
    /// Sanitizes each captured turn. Turns that were never captured yield
    /// empty fields.
    pub fn from_transcript(transcript: &Transcript, sanitizer: &Sanitizer) -> Self {
        let field = |kind: TurnKind| {
            transcript
                .raw(kind)
                .map(|raw| sanitizer.sanitize(raw, kind))
                .unwrap_or_default()
        };

        Self {
            description: field(TurnKind::Description),
            keywords: split_keywords(&field(TurnKind::Keywords)),
            ocr_text: field(TurnKind::Ocr),
        }
    }

    /// Returns true if there is nothing worth writing back.
    pub fn is_empty(&self) -> bool {
        self.description.is_empty() && self.keywords.is_empty() && self.ocr_text.is_empty()
    }
}

/// Splits the keyword answer on commas.
///
/// Each entry is trimmed and stripped of double quotes; empty entries are
/// dropped. Order and case are preserved and duplicates are kept.
pub fn split_keywords(text: &str) -> Vec<String> {
    text.split(',')
        .map(|keyword| keyword.trim().replace('"', ""))
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::{ReadEnd, Turn};

    #[test]
    fn test_split_keywords_trims_in_order() {
        assert_eq!(
            split_keywords("car, red, street, daytime"),
            vec!["car", "red", "street", "daytime"]
        );
    }

    #[test]
    fn test_split_keywords_drops_empty_and_quotes() {
        assert_eq!(
            split_keywords("\"car\", , red ,\"\",street,"),
            vec!["car", "red", "street"]
        );
        assert!(split_keywords("").is_empty());
    }

    #[test]
    fn test_split_keywords_keeps_duplicates_and_case() {
        assert_eq!(split_keywords("Car, car, CAR"), vec!["Car", "car", "CAR"]);
    }

    #[test]
    fn test_from_transcript_sanitizes_each_turn() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::new(
            TurnKind::Description,
            "describe",
            "Added image '/tmp/x.jpg'\r\nA red car on a street.\r\n>>> Send a message",
            ReadEnd::Marker,
        ));
        transcript.push(Turn::new(
            TurnKind::Keywords,
            "keywords",
            "\x1b[0mcar, red, street, daytime\r\n\r\n>>>",
            ReadEnd::Marker,
        ));
        transcript.push(Turn::new(TurnKind::Ocr, "ocr", "None\r\n>>>", ReadEnd::Marker));

        let fields = ResponseFields::from_transcript(&transcript, &Sanitizer::default());
        assert_eq!(fields.description, "A red car on a street.");
        assert_eq!(fields.keywords, vec!["car", "red", "street", "daytime"]);
        assert_eq!(fields.ocr_text, "");
    }

    #[test]
    fn test_missing_turns_yield_empty_fields() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::new(TurnKind::Description, "d", "A dog.", ReadEnd::Closed));
        let fields = ResponseFields::from_transcript(&transcript, &Sanitizer::default());
        assert_eq!(fields.description, "A dog.");
        assert!(fields.keywords.is_empty());
        assert!(fields.ocr_text.is_empty());
        assert!(!fields.is_empty());
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let fields = ResponseFields {
            description: "d".to_string(),
            keywords: vec!["k".to_string()],
            ocr_text: String::new(),
        };
        let json = serde_json::to_value(&fields).expect("serialize");
        assert_eq!(json["description"], "d");
        assert_eq!(json["keywords"][0], "k");
        assert_eq!(json["ocr_text"], "");
    }
}
