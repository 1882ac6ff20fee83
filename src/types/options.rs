//! Session manager options and configuration
//!
//! This module contains the configuration for [`SessionManager`](crate::SessionManager),
//! including a builder and an environment-variable loader.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default cooldown window after an upstream-classified failure (30 seconds)
pub const DEFAULT_COOLDOWN_MS: u64 = 30_000;

/// Phrases that identify upstream connectivity trouble in diagnostics
pub const DEFAULT_UPSTREAM_PATTERNS: &[&str] = &[
    "failed to refresh available models",
    "stream disconnected before completion",
    "error sending request for url",
    "connection reset",
    "timed out",
];

/// Phrases that identify a CLI refusing to run without a real terminal
pub const DEFAULT_INCOMPATIBILITY_PATTERNS: &[&str] = &[
    "not a terminal",
    "not a tty",
    "stdin is not a tty",
    "raw mode is not supported",
    "inappropriate ioctl for device",
];

/// Arguments passed to every one-shot invocation after `exec` (or `exec resume`)
pub const DEFAULT_ONE_SHOT_ARGS: &[&str] = &[
    "--json",
    "--skip-git-repo-check",
    "--dangerously-bypass-approvals-and-sandbox",
];

// ============================================================================
// Session Mode
// ============================================================================

/// How turns are executed against the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// One long-lived process per thread; raw text output
    #[default]
    Interactive,
    /// One process per turn emitting newline-delimited JSON events
    Structured,
}

impl FromStr for SessionMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" | "pty" => Ok(Self::Interactive),
            "structured" | "json" | "exec" | "one-shot" => Ok(Self::Structured),
            other => Err(SessionError::invalid_config(format!(
                "unknown session mode '{other}' (expected interactive|structured)"
            ))),
        }
    }
}

/// Pseudo-terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtyDimensions {
    /// Terminal rows
    pub rows: u16,
    /// Terminal columns
    pub cols: u16,
}

impl Default for PtyDimensions {
    fn default() -> Self {
        Self { rows: 40, cols: 120 }
    }
}

// ============================================================================
// Session Options
// ============================================================================

/// Main options for [`SessionManager`](crate::SessionManager)
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Path to the CLI binary (searched on PATH when `None`)
    pub program: Option<PathBuf>,
    /// Turn execution mode
    pub mode: SessionMode,
    /// Arguments for the long-lived interactive process
    pub interactive_args: Vec<String>,
    /// Arguments for one-shot invocations, after `exec`
    pub one_shot_args: Vec<String>,
    /// Cooldown window opened by an upstream-classified failure
    pub cooldown: Duration,
    /// Treat reasoning items as assistant output in structured mode
    pub include_reasoning: bool,
    /// Lowercase phrases classifying a failure as upstream connectivity
    pub upstream_patterns: Vec<String>,
    /// Lowercase phrases triggering the permanent one-shot downgrade
    pub incompatibility_patterns: Vec<String>,
    /// Pseudo-terminal size
    pub pty_size: PtyDimensions,
    /// Extra environment variables for spawned processes
    pub env: HashMap<String, String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            program: None,
            mode: SessionMode::default(),
            interactive_args: Vec::new(),
            one_shot_args: DEFAULT_ONE_SHOT_ARGS.iter().map(|s| (*s).to_string()).collect(),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            include_reasoning: false,
            upstream_patterns: to_owned_list(DEFAULT_UPSTREAM_PATTERNS),
            incompatibility_patterns: to_owned_list(DEFAULT_INCOMPATIBILITY_PATTERNS),
            pty_size: PtyDimensions::default(),
            env: HashMap::new(),
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl SessionOptions {
    /// Create a new builder for `SessionOptions`
    #[must_use]
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }

    /// Load options from `CODEX_SESSION_*` environment variables
    ///
    /// Unset or malformed variables keep their defaults; a malformed mode is
    /// logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load options through an arbitrary variable lookup
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(program) = lookup("CODEX_SESSION_BIN").filter(|v| !v.trim().is_empty()) {
            options.program = Some(PathBuf::from(program.trim()));
        }

        if let Some(mode) = lookup("CODEX_SESSION_MODE").filter(|v| !v.trim().is_empty()) {
            match mode.parse() {
                Ok(mode) => options.mode = mode,
                Err(e) => log::warn!("Ignoring CODEX_SESSION_MODE: {e}"),
            }
        }

        if let Some(ms) = lookup("CODEX_SESSION_COOLDOWN_MS").and_then(|v| positive_int(&v)) {
            options.cooldown = Duration::from_millis(ms);
        }

        options.include_reasoning = env_flag(
            lookup("CODEX_SESSION_INCLUDE_REASONING").as_deref(),
            false,
        );

        if let Some(list) = lookup("CODEX_SESSION_UPSTREAM_PATTERNS").map(|v| parse_csv(&v))
            && !list.is_empty()
        {
            options.upstream_patterns = list;
        }

        if let Some(list) = lookup("CODEX_SESSION_TTY_PATTERNS").map(|v| parse_csv(&v))
            && !list.is_empty()
        {
            options.incompatibility_patterns = list;
        }

        options
    }
}

/// Interpret a boolean flag (`1|true|yes|on`), falling back when unset
#[must_use]
pub fn env_flag(value: Option<&str>, default_value: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => default_value,
        Some(v) if v.is_empty() => default_value,
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
    }
}

fn positive_int(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|v| *v > 0)
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

// ============================================================================
// Builder for SessionOptions
// ============================================================================

/// Builder for `SessionOptions`
#[derive(Debug, Default)]
pub struct SessionOptionsBuilder {
    options: SessionOptions,
}

impl SessionOptionsBuilder {
    /// Set the CLI binary path
    #[must_use]
    pub fn program(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.program = Some(path.into());
        self
    }

    /// Set the turn execution mode
    #[must_use]
    pub const fn mode(mut self, mode: SessionMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Set the interactive process arguments
    #[must_use]
    pub fn interactive_args(mut self, args: Vec<impl Into<String>>) -> Self {
        self.options.interactive_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the one-shot invocation arguments
    #[must_use]
    pub fn one_shot_args(mut self, args: Vec<impl Into<String>>) -> Self {
        self.options.one_shot_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the cooldown window
    #[must_use]
    pub const fn cooldown(mut self, window: Duration) -> Self {
        self.options.cooldown = window;
        self
    }

    /// Include reasoning items in structured output
    #[must_use]
    pub const fn include_reasoning(mut self, include: bool) -> Self {
        self.options.include_reasoning = include;
        self
    }

    /// Replace the upstream-connectivity phrase list
    #[must_use]
    pub fn upstream_patterns(mut self, patterns: Vec<impl Into<String>>) -> Self {
        self.options.upstream_patterns = patterns
            .into_iter()
            .map(|p| p.into().to_lowercase())
            .collect();
        self
    }

    /// Replace the terminal-incompatibility phrase list
    #[must_use]
    pub fn incompatibility_patterns(mut self, patterns: Vec<impl Into<String>>) -> Self {
        self.options.incompatibility_patterns = patterns
            .into_iter()
            .map(|p| p.into().to_lowercase())
            .collect();
        self
    }

    /// Set the pseudo-terminal size
    #[must_use]
    pub const fn pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.options.pty_size = PtyDimensions { rows, cols };
        self
    }

    /// Add an environment variable for spawned processes
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> SessionOptions {
        self.options
    }
}
