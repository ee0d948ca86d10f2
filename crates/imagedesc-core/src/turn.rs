//! Captured request/response exchanges.

use serde::Serialize;
use std::fmt;

/// The three turns of the protocol, in the order they are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Description,
    Keywords,
    Ocr,
}

impl TurnKind {
    /// Protocol order.
    pub const ALL: [TurnKind; 3] = [TurnKind::Description, TurnKind::Keywords, TurnKind::Ocr];

    /// 1-based position in the protocol.
    pub fn number(self) -> usize {
        match self {
            TurnKind::Description => 1,
            TurnKind::Keywords => 2,
            TurnKind::Ocr => 3,
        }
    }

    /// The turn sent after this one, if any.
    pub fn next(self) -> Option<TurnKind> {
        match self {
            TurnKind::Description => Some(TurnKind::Keywords),
            TurnKind::Keywords => Some(TurnKind::Ocr),
            TurnKind::Ocr => None,
        }
    }
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnKind::Description => "description",
            TurnKind::Keywords => "keywords",
            TurnKind::Ocr => "ocr",
        };
        f.write_str(name)
    }
}

/// Why a marker-bounded read stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadEnd {
    /// The completion marker was observed.
    Marker,
    /// The read timeout elapsed first; the text is partial.
    TimedOut,
    /// The peer end closed (the program exited or crashed).
    Closed,
}

impl ReadEnd {
    /// Returns true if the response was properly framed by the marker.
    pub fn is_framed(self) -> bool {
        self == ReadEnd::Marker
    }
}

/// One prompt and the raw text it produced.
///
/// `raw` is fixed once captured; sanitizing produces a new string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    kind: TurnKind,
    prompt: String,
    raw: String,
    end: ReadEnd,
}

impl Turn {
    pub fn new(kind: TurnKind, prompt: impl Into<String>, raw: impl Into<String>, end: ReadEnd) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            raw: raw.into(),
            end,
        }
    }

    pub fn kind(&self) -> TurnKind {
        self.kind
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn end(&self) -> ReadEnd {
        self.end
    }
}

/// Ordered turns captured during one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a captured turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn get(&self, kind: TurnKind) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.kind == kind)
    }

    /// Raw response for `kind`, if that turn was captured.
    pub fn raw(&self, kind: TurnKind) -> Option<&str> {
        self.get(kind).map(Turn::raw)
    }

    /// Returns true once all three turns have been captured.
    pub fn is_complete(&self) -> bool {
        TurnKind::ALL.iter().all(|kind| self.get(*kind).is_some())
    }

    /// Returns true if any captured turn ended without seeing the marker.
    pub fn is_degraded(&self) -> bool {
        self.turns.iter().any(|turn| !turn.end.is_framed())
    }
}
