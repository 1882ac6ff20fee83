//! # Codex Session Manager
//!
//! Keeps one long-lived Codex CLI process per conversation thread, serializes
//! prompt/response turns against it, streams incremental output to callers,
//! and recovers from transport failures, crashes and upstream outages.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kodegen_codex_session::{SessionManager, SessionOptions, TurnRequest};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SessionManager::new(SessionOptions::from_env());
//!
//!     let request = TurnRequest::new("Summarize the README")
//!         .with_idle(Duration::from_millis(1_500))
//!         .on_chunk(|text| print!("{text}"));
//!
//!     let result = manager.continue_turn("thread-1", "/tmp", request).await?;
//!     println!("\n{}", result.output);
//!
//!     manager.stop("thread-1");
//!     Ok(())
//! }
//! ```
//!
//! ## Execution Modes
//!
//! - **Interactive** (default): one process per thread, attached to a
//!   pseudo-terminal when possible and to pipes otherwise. A turn ends when
//!   output goes quiet for the idle window, or fails at the hard timeout.
//! - **Structured**: `codex exec --json` per turn. Assistant text, tool
//!   diagnostics and the resumable session id are parsed from the event
//!   stream, and the next turn resumes the same remote session.
//!
//! A thread whose CLI refuses to run without a real terminal is switched to
//! structured invocations permanently.
//!
//! ## Failure Handling
//!
//! Failures are reported as [`SessionError`]. When diagnostics point at
//! upstream connectivity trouble the thread enters a cooldown window, during
//! which new turns fail fast with [`SessionError::CooldownActive`].
//!
//! ## Architecture
//!
//! - [`types`]: Options, requests and status types
//! - [`transport`]: Process handles (pty, pipe, one-shot) and their factory
//! - [`message`]: Output parsers for both protocols
//! - [`manager`]: Session registry, turn queue, timers, cooldown, exits
//! - [`tools`]: Action-dispatch tool surface
//! - [`error`]: Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod manager;
pub mod message;
pub mod tools;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use error::{Result, SessionError};
pub use manager::{SessionManager, TurnStreamEvent};
pub use tools::{SessionAction, SessionTool, SessionToolArgs, ToolContext, ToolResponse};
pub use transport::{
    EventHub, EventReceiver, LaunchCommand, OutputStream, ProcessTransportFactory, PtySpawner,
    Transport, TransportCapabilities, TransportEvent, TransportExit, TransportFactory,
    TransportHandle, TransportKind,
};
pub use types::identifiers::{RemoteSessionId, TurnId};
pub use types::options::{PtyDimensions, SessionMode, SessionOptions, SessionOptionsBuilder};
pub use types::session::{
    AbsentStatus, ChunkCallback, CooldownInfo, ExitInfo, RunningStatus, SessionStatus,
    StartResult, StopResult, TurnOutput, TurnRequest,
};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
