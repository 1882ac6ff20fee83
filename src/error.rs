//! Error types for Codex session management

use thiserror::Error;

/// Maximum number of tail characters embedded in an error message
pub const ERROR_TAIL_CHARS: usize = 2_000;

/// Main error type for session management
#[derive(Error, Debug)]
pub enum SessionError {
    /// Prompt was empty after trimming
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream backend presumed unavailable for this thread
    #[error("Codex backend currently unavailable. Retry in ~{remaining_secs}s.{}", reason_suffix(.reason))]
    CooldownActive {
        /// Seconds until the cooldown window closes (rounded up)
        remaining_secs: u64,
        /// Diagnostic snippet that opened the window
        reason: Option<String>,
    },

    /// Neither a pseudo-terminal nor a pipe-backed process could be acquired
    #[error("Failed to start Codex session: {0}")]
    StartupFailure(String),

    /// Hard per-turn ceiling exceeded
    #[error("Codex turn timed out after {timeout_ms}ms{}", tail_suffix(.output_tail))]
    TurnTimeout {
        /// Configured hard timeout
        timeout_ms: u64,
        /// Bounded recent output
        output_tail: String,
    },

    /// Caller cancelled the in-flight turn
    #[error("Codex turn aborted")]
    TurnAborted,

    /// Process exited while a turn was in flight
    #[error("Codex process exited mid-turn (exitCode={}, signal={}){}", fmt_opt(.exit_code), fmt_opt(.signal), tail_suffix(.output_tail))]
    ProcessExited {
        /// Exit code if the process exited normally
        exit_code: Option<i32>,
        /// Terminating signal, if any
        signal: Option<String>,
        /// Bounded recent output
        output_tail: String,
    },

    /// Nonzero exit classified as upstream connectivity trouble
    #[error("Codex upstream unavailable (exitCode={}): {details}", fmt_opt(.exit_code))]
    UpstreamFailure {
        /// Exit code of the failed invocation
        exit_code: Option<i32>,
        /// Recent diagnostics
        details: String,
    },

    /// Nonzero exit with no recognizable cause
    #[error("Codex failed (exitCode={}): {details}", fmt_opt(.exit_code))]
    UnknownFailure {
        /// Exit code of the failed invocation
        exit_code: Option<i32>,
        /// Recent diagnostics
        details: String,
    },

    /// Transport write or control failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

fn fmt_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" Last error: {r}"))
        .unwrap_or_default()
}

fn tail_suffix(tail: &str) -> String {
    if tail.trim().is_empty() {
        String::new()
    } else {
        format!("\nRecent output:\n{tail}")
    }
}

/// Keep only the last `max_chars` characters of `text`
#[must_use]
pub fn bounded_tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect()
}

impl SessionError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a startup failure
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::StartupFailure(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a turn timeout error, bounding the embedded tail
    #[must_use]
    pub fn turn_timeout(timeout_ms: u64, output_tail: &str) -> Self {
        Self::TurnTimeout {
            timeout_ms,
            output_tail: bounded_tail(output_tail, ERROR_TAIL_CHARS),
        }
    }

    /// Create a process-exited error, bounding the embedded tail
    #[must_use]
    pub fn process_exited(exit_code: Option<i32>, signal: Option<String>, output_tail: &str) -> Self {
        Self::ProcessExited {
            exit_code,
            signal,
            output_tail: bounded_tail(output_tail, ERROR_TAIL_CHARS),
        }
    }

    /// Whether this failure was produced before any process interaction
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::CooldownActive { .. })
    }

    /// Short machine-readable name of the error kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::CooldownActive { .. } => "cooldown_active",
            Self::StartupFailure(_) => "startup_failure",
            Self::TurnTimeout { .. } => "turn_timeout",
            Self::TurnAborted => "turn_aborted",
            Self::ProcessExited { .. } => "process_exited",
            Self::UpstreamFailure { .. } => "upstream_failure",
            Self::UnknownFailure { .. } => "unknown_failure",
            Self::Transport(_) => "transport",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}
