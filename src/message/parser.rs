//! Output parsers for the two Codex protocols
//!
//! [`InteractiveParser`] passes terminal output through untouched.
//! [`StructuredParser`] splits newline-delimited JSON into assistant text,
//! diagnostics and the resumable session id.

use crate::transport::OutputStream;

use super::events::{AGENT_MESSAGE, CodexEvent, ITEM_COMPLETED, REASONING, THREAD_STARTED};

/// One classified piece of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserEvent {
    /// Opaque terminal text
    Text(String),
    /// Assistant-authored text
    Assistant(String),
    /// Tool output, stderr or unparseable lines
    Diagnostic(String),
    /// Resumable session id issued by the CLI
    SessionStarted(String),
}

/// Consumes raw output chunks and produces classified events
pub trait OutputParser: Send {
    /// Feed one chunk from `stream`
    fn push(&mut self, stream: OutputStream, chunk: &str) -> Vec<ParserEvent>;

    /// Flush anything buffered once the process has exited
    fn finish(&mut self) -> Vec<ParserEvent>;
}

// ============================================================================
// Interactive
// ============================================================================

/// Treats all output as opaque text
#[derive(Debug, Default)]
pub struct InteractiveParser;

impl OutputParser for InteractiveParser {
    fn push(&mut self, _stream: OutputStream, chunk: &str) -> Vec<ParserEvent> {
        if chunk.is_empty() {
            Vec::new()
        } else {
            vec![ParserEvent::Text(chunk.to_string())]
        }
    }

    fn finish(&mut self) -> Vec<ParserEvent> {
        Vec::new()
    }
}

// ============================================================================
// Structured
// ============================================================================

/// Splits a byte stream into complete lines, normalizing `\r\n` and lone `\r`
#[derive(Debug, Default)]
pub struct LineSplitter {
    rest: String,
}

impl LineSplitter {
    /// Append a chunk and return the lines it completed
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.rest.push_str(chunk);
        // A trailing `\r` may be the first half of a `\r\n` split across reads.
        let pending_cr = self.rest.ends_with('\r');
        let body = if pending_cr {
            &self.rest[..self.rest.len() - 1]
        } else {
            self.rest.as_str()
        };
        let normalized = body.replace("\r\n", "\n").replace('\r', "\n");
        let mut parts: Vec<String> = normalized.split('\n').map(str::to_string).collect();
        self.rest = parts.pop().unwrap_or_default();
        if pending_cr {
            self.rest.push('\r');
        }
        parts
    }

    /// Return the unterminated remainder, if any
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.rest);
        let rest = rest.trim_end_matches('\r');
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

/// Parser for `codex exec --json` output
#[derive(Debug, Default)]
pub struct StructuredParser {
    include_reasoning: bool,
    stdout: LineSplitter,
    stderr: LineSplitter,
}

impl StructuredParser {
    /// Create a parser; reasoning items count as assistant text when enabled
    #[must_use]
    pub fn new(include_reasoning: bool) -> Self {
        Self {
            include_reasoning,
            ..Self::default()
        }
    }

    fn stdout_line(&self, line: &str, out: &mut Vec<ParserEvent>) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        match CodexEvent::parse_line(trimmed) {
            Some(event) => self.on_event(event, out),
            None => out.push(ParserEvent::Diagnostic(trimmed.to_string())),
        }
    }

    fn on_event(&self, event: CodexEvent, out: &mut Vec<ParserEvent>) {
        if event.kind == THREAD_STARTED {
            if let Some(id) = event.thread_id.filter(|id| !id.is_empty()) {
                out.push(ParserEvent::SessionStarted(id));
            }
            return;
        }

        if event.kind != ITEM_COMPLETED {
            return;
        }

        let Some(item) = event.item else {
            return;
        };
        let text = item.text.as_deref().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return;
        }

        match item.kind.as_deref() {
            Some(AGENT_MESSAGE) => out.push(ParserEvent::Assistant(text.to_string())),
            Some(REASONING) if self.include_reasoning => {
                out.push(ParserEvent::Assistant(text.to_string()));
            }
            Some(REASONING) | None => {}
            Some(other) => out.push(ParserEvent::Diagnostic(format!("{other}: {text}"))),
        }
    }
}

fn stderr_line(line: &str, out: &mut Vec<ParserEvent>) {
    let trimmed = line.trim();
    if !trimmed.is_empty() {
        out.push(ParserEvent::Diagnostic(trimmed.to_string()));
    }
}

impl OutputParser for StructuredParser {
    fn push(&mut self, stream: OutputStream, chunk: &str) -> Vec<ParserEvent> {
        let mut out = Vec::new();
        match stream {
            OutputStream::Stdout => {
                for line in self.stdout.push(chunk) {
                    self.stdout_line(&line, &mut out);
                }
            }
            OutputStream::Stderr => {
                for line in self.stderr.push(chunk) {
                    stderr_line(&line, &mut out);
                }
            }
        }
        out
    }

    fn finish(&mut self) -> Vec<ParserEvent> {
        let mut out = Vec::new();
        if let Some(line) = self.stdout.finish() {
            self.stdout_line(&line, &mut out);
        }
        if let Some(line) = self.stderr.finish() {
            stderr_line(&line, &mut out);
        }
        out
    }
}
