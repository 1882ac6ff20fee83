use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::manager::{NO_OUTPUT_MESSAGE, SessionManager};
use crate::types::session::{DEFAULT_IDLE_WINDOW, DEFAULT_TURN_TIMEOUT, TurnRequest};

/// Tool name under which the session tool is registered
pub const SESSION_TOOL_NAME: &str = "codex";

const SESSION_TOOL_DESCRIPTION: &str = "Manage a long-lived Codex CLI session. Actions: start, \
     continue, stop, status. Continue sends the prompt to the existing Codex session; without an \
     action, a prompt means continue and no prompt means status.";

/// Action requested from the session tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    /// Ensure a session is running
    Start,
    /// Send a prompt to the session
    Continue,
    /// Stop the session
    Stop,
    /// Report session status
    Status,
}

impl SessionAction {
    /// Wire name of the action
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Continue => "continue",
            Self::Stop => "stop",
            Self::Status => "status",
        }
    }
}

/// Tool arguments as received from an agent
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SessionToolArgs {
    /// Requested action; inferred from `prompt` when absent
    #[serde(default)]
    pub action: Option<SessionAction>,
    /// Prompt to send when action=continue
    #[serde(default)]
    pub prompt: Option<String>,
}

impl SessionToolArgs {
    /// Effective action: explicit, else `continue` with a prompt, else `status`
    #[must_use]
    pub fn resolved_action(&self) -> SessionAction {
        self.action.unwrap_or_else(|| {
            if self.prompt.as_deref().is_some_and(|p| !p.is_empty()) {
                SessionAction::Continue
            } else {
                SessionAction::Status
            }
        })
    }
}

/// Human summary plus machine-readable details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Text shown to the agent or user
    pub text: String,
    /// Structured payload
    pub details: Value,
}

/// Receives streaming updates during `continue`
pub type UpdateCallback = Arc<dyn Fn(ToolResponse) + Send + Sync>;

/// Per-call context
#[derive(Clone, Default)]
pub struct ToolContext {
    /// Cancels an in-flight `continue`
    pub cancel: Option<CancellationToken>,
    /// Receives one update per output chunk
    pub on_update: Option<UpdateCallback>,
}

/// Action-dispatch surface over [`SessionManager`] bound to one thread
///
/// Every call produces a [`ToolResponse`]; failures are reported as text.
#[derive(Clone)]
pub struct SessionTool {
    manager: SessionManager,
    thread_id: String,
    cwd: PathBuf,
    timeout: Duration,
    idle: Duration,
}

impl SessionTool {
    /// Create a tool for `thread_id` running in `cwd`
    pub fn new(manager: SessionManager, thread_id: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            thread_id: thread_id.into(),
            cwd: cwd.into(),
            timeout: DEFAULT_TURN_TIMEOUT,
            idle: DEFAULT_IDLE_WINDOW,
        }
    }

    /// Override the turn timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeout: Duration, idle: Duration) -> Self {
        self.timeout = timeout;
        self.idle = idle;
        self
    }

    /// Registered tool name
    #[must_use]
    pub const fn name() -> &'static str {
        SESSION_TOOL_NAME
    }

    /// Description shown to the model
    #[must_use]
    pub const fn description() -> &'static str {
        SESSION_TOOL_DESCRIPTION
    }

    /// JSON Schema of [`SessionToolArgs`]
    #[must_use]
    pub fn input_schema() -> Value {
        schemars::schema_for!(SessionToolArgs).to_value()
    }

    /// Execute one tool call
    pub async fn execute(&self, args: SessionToolArgs, ctx: ToolContext) -> ToolResponse {
        let action = args.resolved_action();
        match action {
            SessionAction::Start => self.handle_start(),
            SessionAction::Status => self.handle_status(),
            SessionAction::Stop => self.handle_stop(),
            SessionAction::Continue => self.handle_continue(args.prompt.unwrap_or_default(), ctx).await,
        }
    }

    fn handle_start(&self) -> ToolResponse {
        let result = self.manager.start(&self.thread_id, &self.cwd);
        let pid = fmt_pid(result.pid);
        let text = if let Some(ref error) = result.error {
            format!("Codex start failed: {error}")
        } else if result.started {
            format!(
                "Started Codex session for thread {} (pid={pid}) in {}",
                self.thread_id,
                self.cwd.display()
            )
        } else {
            format!(
                "Codex session already running for thread {} (pid={pid})",
                self.thread_id
            )
        };
        ToolResponse {
            text,
            details: with_action(SessionAction::Start, &result),
        }
    }

    fn handle_status(&self) -> ToolResponse {
        let status = self.manager.status(&self.thread_id);
        let text = if status.is_running() {
            format!(
                "Codex session is running for thread {} (pid={})",
                self.thread_id,
                fmt_pid(status.pid())
            )
        } else {
            format!("No Codex session running for thread {}", self.thread_id)
        };
        ToolResponse {
            text,
            details: with_action(SessionAction::Status, &status),
        }
    }

    fn handle_stop(&self) -> ToolResponse {
        let result = self.manager.stop(&self.thread_id);
        let text = if result.stopped {
            format!("Stopped Codex session for thread {}", self.thread_id)
        } else {
            format!("No Codex session to stop for thread {}", self.thread_id)
        };
        ToolResponse {
            text,
            details: with_action(SessionAction::Stop, &result),
        }
    }

    async fn handle_continue(&self, prompt: String, ctx: ToolContext) -> ToolResponse {
        let action = SessionAction::Continue;
        let mut request = TurnRequest::new(prompt)
            .with_timeout(self.timeout)
            .with_idle(self.idle);
        if let Some(cancel) = ctx.cancel {
            request = request.with_cancel(cancel);
        }
        if let Some(on_update) = ctx.on_update {
            let thread_id = self.thread_id.clone();
            request = request.on_chunk(move |text| {
                on_update(ToolResponse {
                    text: text.to_string(),
                    details: json!({
                        "status": "stream",
                        "action": action.as_str(),
                        "threadId": thread_id,
                    }),
                });
            });
        }

        match self
            .manager
            .continue_turn(&self.thread_id, &self.cwd, request)
            .await
        {
            Ok(result) => ToolResponse {
                text: if result.output.is_empty() {
                    NO_OUTPUT_MESSAGE.to_string()
                } else {
                    result.output
                },
                details: json!({
                    "action": action.as_str(),
                    "threadId": self.thread_id,
                    "cwd": self.cwd,
                }),
            },
            Err(e) => ToolResponse {
                text: format!("Codex continue failed: {e}"),
                details: json!({
                    "action": action.as_str(),
                    "threadId": self.thread_id,
                    "cwd": self.cwd,
                    "error": e.to_string(),
                    "errorKind": e.kind(),
                }),
            },
        }
    }
}

fn fmt_pid(pid: Option<u32>) -> String {
    pid.map_or_else(|| "unknown".to_string(), |p| p.to_string())
}

fn with_action<T: Serialize>(action: SessionAction, payload: &T) -> Value {
    let mut details = serde_json::to_value(payload).unwrap_or_else(|_| json!({}));
    if let Value::Object(ref mut map) = details {
        map.insert("action".to_string(), Value::String(action.as_str().to_string()));
        details
    } else {
        json!({ "action": action.as_str(), "result": details })
    }
}
