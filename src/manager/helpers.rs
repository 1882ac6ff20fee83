//! Helper types for session bookkeeping
//!
//! Pure helpers for bounded output and incompatibility detection.

/// Maximum characters retained in a session's output tail
pub const MAX_OUTPUT_TAIL: usize = 8_000;

/// Bounded record of the most recent output, trimmed by characters
#[derive(Debug, Clone, Default)]
pub struct OutputTail {
    text: String,
    max_chars: usize,
}

impl OutputTail {
    /// Create a tail holding at most [`MAX_OUTPUT_TAIL`] characters
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_OUTPUT_TAIL)
    }

    /// Create a tail holding at most `max_chars` characters
    #[must_use]
    pub fn with_capacity(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            max_chars,
        }
    }

    /// Append text, dropping the oldest characters past the cap
    pub fn push(&mut self, extra: &str) {
        self.text.push_str(extra);
        let total = self.text.chars().count();
        if total > self.max_chars {
            let cut = self
                .text
                .char_indices()
                .nth(total - self.max_chars)
                .map_or(self.text.len(), |(idx, _)| idx);
            self.text.drain(..cut);
        }
    }

    /// Current contents
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Owned copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.text.clone()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Whether `text` contains any of the lowercase `patterns`
#[must_use]
pub fn contains_any(text: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() || text.is_empty() {
        return false;
    }
    let normalized = text.to_lowercase();
    patterns
        .iter()
        .any(|p| !p.is_empty() && normalized.contains(p.as_str()))
}

/// Drops a terminal's echo of the submitted prompt from the front of a turn
///
/// A pseudo-terminal in canonical mode echoes the input line, with each
/// newline rendered as `\r\n`. Output is held back while it still matches
/// the expected echo and released unchanged as soon as it diverges.
#[derive(Debug, Clone, Default)]
pub struct EchoFilter {
    expected: Option<String>,
    held: String,
}

impl EchoFilter {
    /// Filter for the echo of `prompt`
    #[must_use]
    pub fn new(prompt: &str) -> Self {
        if prompt.is_empty() {
            return Self::default();
        }
        Self {
            expected: Some(format!("{}\r\n", prompt.replace('\n', "\r\n"))),
            held: String::new(),
        }
    }

    /// Filter that passes everything through
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Text from `chunk` that belongs to the turn's output
    pub fn push(&mut self, chunk: &str) -> String {
        let Some(ref expected) = self.expected else {
            return chunk.to_string();
        };
        self.held.push_str(chunk);

        if let Some(rest) = self.held.strip_prefix(expected.as_str()) {
            let rest = rest.to_string();
            self.expected = None;
            self.held.clear();
            return rest;
        }
        if expected.starts_with(self.held.as_str()) {
            return String::new();
        }
        self.expected = None;
        std::mem::take(&mut self.held)
    }

    /// Release anything still held back
    pub fn finish(&mut self) -> String {
        self.expected = None;
        std::mem::take(&mut self.held)
    }
}

/// Join the last `n` lines of `lines` with newlines
pub(crate) fn last_lines(lines: &[String], n: usize) -> String {
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n").trim().to_string()
}
