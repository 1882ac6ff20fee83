//! Request and response types for session operations
//!
//! All response types serialize with camelCase field names so they can be
//! relayed to chat front ends unchanged.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::transport::TransportKind;
use crate::types::identifiers::RemoteSessionId;

// ============================================================================
// Turn Request
// ============================================================================

/// Default hard ceiling for one turn (10 minutes)
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default silence window that ends an interactive turn
pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_millis(1_200);

/// Callback receiving streamed output chunks during a turn
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Parameters for one prompt/response turn
#[derive(Clone)]
pub struct TurnRequest {
    /// Prompt text (trimmed before use)
    pub prompt: String,
    /// Hard ceiling for the whole turn
    pub timeout: Duration,
    /// Silence window after the last chunk (interactive mode)
    pub idle: Duration,
    /// Cancels only this turn
    pub cancel: Option<CancellationToken>,
    /// Receives output chunks as they arrive
    pub on_chunk: Option<ChunkCallback>,
}

impl TurnRequest {
    /// Create a request with default timeouts
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            timeout: DEFAULT_TURN_TIMEOUT,
            idle: DEFAULT_IDLE_WINDOW,
            cancel: None,
            on_chunk: None,
        }
    }

    /// Set the hard timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the idle window
    #[must_use]
    pub const fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attach a chunk callback
    #[must_use]
    pub fn on_chunk(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_chunk = Some(Arc::new(callback));
        self
    }

    pub(crate) fn emit(&self, text: &str) {
        if let Some(ref callback) = self.on_chunk {
            callback(text);
        }
    }
}

impl fmt::Debug for TurnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnRequest")
            .field("prompt", &self.prompt)
            .field("timeout", &self.timeout)
            .field("idle", &self.idle)
            .field("cancel", &self.cancel.is_some())
            .field("on_chunk", &self.on_chunk.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Result of a successful turn
///
/// On a pseudo-terminal the echo of the submitted prompt is removed; the rest
/// is the raw terminal text, so it keeps `\r\n` line endings and any escape
/// sequences the CLI prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutput {
    /// Final output text
    pub output: String,
}

// ============================================================================
// Lifecycle Responses
// ============================================================================

/// Response from `start`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResult {
    /// TRUE if a new session record was created by this call
    pub started: bool,
    /// TRUE if a session is live after this call
    pub running: bool,
    /// Thread the session belongs to
    pub thread_id: String,
    /// Working directory of the session
    pub cwd: PathBuf,
    /// Process id of the persistent transport, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Acquisition failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response from `stop`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    /// TRUE if a live session was stopped
    pub stopped: bool,
    /// Always FALSE after stop
    pub running: bool,
    /// Thread the request targeted
    pub thread_id: String,
}

/// Diagnostics captured when a session process exits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    /// Thread the process belonged to
    pub thread_id: String,
    /// Working directory of the process
    pub cwd: PathBuf,
    /// Exit code, when the process exited normally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Terminating signal, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    /// Output tail snapshot at exit
    pub output_tail: String,
    /// When the exit was observed
    pub exited_at: DateTime<Utc>,
}

/// Active cooldown window for a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownInfo {
    /// End of the window
    pub unavailable_until: DateTime<Utc>,
    /// Diagnostic snippet that opened the window
    pub reason: String,
}

/// Status of a thread with no live session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsentStatus {
    /// Always FALSE
    pub running: bool,
    /// Thread the query targeted
    pub thread_id: String,
    /// Diagnostics from the last process exit, if any
    pub last_exit: Option<ExitInfo>,
}

/// Status of a thread with a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningStatus {
    /// Always TRUE
    pub running: bool,
    /// Thread the session belongs to
    pub thread_id: String,
    /// Working directory of the session
    pub cwd: PathBuf,
    /// Process id of the persistent transport, when there is one
    pub pid: Option<u32>,
    /// When the session record was created
    pub created_at: DateTime<Utc>,
    /// When the session last served a turn or start call
    pub last_used_at: DateTime<Utc>,
    /// Transport backing the session
    pub transport_kind: TransportKind,
    /// Recent output (bounded)
    pub output_tail: String,
    /// Resumable id issued by the CLI, if any
    pub remote_session_id: Option<RemoteSessionId>,
    /// Active cooldown, if any
    pub cooldown: Option<CooldownInfo>,
}

/// Response from `status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionStatus {
    /// Live session
    Running(RunningStatus),
    /// No live session
    Absent(AbsentStatus),
}

impl SessionStatus {
    /// Whether a session is live
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// Last exit diagnostics for an absent session
    #[must_use]
    pub const fn last_exit(&self) -> Option<&ExitInfo> {
        match self {
            Self::Absent(absent) => absent.last_exit.as_ref(),
            Self::Running(_) => None,
        }
    }

    /// Process id of a live session
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        match self {
            Self::Running(running) => running.pid,
            Self::Absent(_) => None,
        }
    }
}
