//! Type definitions for Codex session management
//!
//! - [`identifiers`] - Type-safe ID wrappers (`TurnId`, `RemoteSessionId`)
//! - [`options`] - Manager configuration, builder and environment loader
//! - [`session`] - Turn requests and lifecycle/status responses

pub mod identifiers;
pub mod options;
pub mod session;

pub use identifiers::{RemoteSessionId, TurnId};
pub use options::{PtyDimensions, SessionMode, SessionOptions, SessionOptionsBuilder};
pub use session::{
    AbsentStatus, ChunkCallback, CooldownInfo, ExitInfo, RunningStatus, SessionStatus,
    StartResult, StopResult, TurnOutput, TurnRequest,
};
