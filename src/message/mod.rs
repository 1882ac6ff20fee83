//! Output parsing for Codex processes

pub mod events;
pub mod parser;

pub use events::{CodexEvent, CodexItem};
pub use parser::{InteractiveParser, LineSplitter, OutputParser, ParserEvent, StructuredParser};

use crate::types::options::SessionMode;

/// Parser matching the configured session mode
#[must_use]
pub fn parser_for(mode: SessionMode, include_reasoning: bool) -> Box<dyn OutputParser> {
    match mode {
        SessionMode::Interactive => Box::new(InteractiveParser),
        SessionMode::Structured => Box::new(StructuredParser::new(include_reasoning)),
    }
}
