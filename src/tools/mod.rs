//! Tool surface over the session manager
//!
//! Provides an action-dispatch tool (`start | continue | stop | status`) that
//! agent frameworks can expose to a model.

mod session_tool;

pub use session_tool::{
    SESSION_TOOL_NAME, SessionAction, SessionTool, SessionToolArgs, ToolContext, ToolResponse,
    UpdateCallback,
};
