//! # imagedesc-core
//!
//! Domain types for describing an image through an interactive multimodal
//! chat REPL.
//!
//! This crate provides:
//! - Session configuration with explicit poll/timeout bounds
//! - The fixed three-turn prompt protocol and image path quoting
//! - The captured transcript model (`Turn`, `Transcript`, `ReadEnd`)
//! - The response sanitizer that recovers clean text from terminal output
//! - `ResponseFields`, the description/keywords/OCR triple handed to callers
//!
//! Nothing here touches a process or a terminal; see `imagedesc-adapters`
//! for the PTY side.

mod config;
mod fields;
pub mod prompts;
pub mod sanitize;
mod turn;

pub use config::{DEFAULT_MARKER, SessionConfig, Verbosity};
pub use fields::{ResponseFields, split_keywords};
pub use prompts::{PromptSet, quote_path};
pub use sanitize::Sanitizer;
pub use turn::{ReadEnd, Transcript, Turn, TurnKind};
