//! Codex session management
//!
//! Provides `SessionManager` for keeping one Codex process per conversation
//! thread, serializing turns against it, and recovering from crashes and
//! upstream outages.
//!
//! # Module Structure
//!
//! - `session_manager` - Core `SessionManager` with public API
//! - `session` - Session record structures
//! - `queue` - Per-session turn serialization
//! - `completion` - Idle/hard timer policy
//! - `cooldown` - Failure classification and backend cooldown
//! - `exits` - Last-exit diagnostics
//! - `helpers` - Output tail, prompt echo filtering and pattern matching

pub mod completion;
pub mod cooldown;
pub mod exits;
pub mod helpers;
pub mod queue;
mod session;
mod session_manager;

pub use completion::{Completion, CompletionDetector};
pub use cooldown::{CooldownTracker, is_upstream_connectivity_error};
pub use exits::ExitTracker;
pub use helpers::{EchoFilter, MAX_OUTPUT_TAIL, OutputTail};
pub use queue::TurnQueue;
pub use session_manager::{NO_OUTPUT_MESSAGE, SessionManager, TurnStreamEvent};
