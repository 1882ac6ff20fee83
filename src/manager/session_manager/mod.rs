//! Session manager implementation
//!
//! This module is organized into logical submodules:
//! - `core`: Core struct, constructors, and the exit handler
//! - `lifecycle`: start, status, stop, shutdown, list
//! - `turn`: `continue_turn` orchestration and downgrade
//! - `interactive`: Turns against a persistent transport
//! - `structured`: One-shot `exec --json` turns
//! - `stream`: Turns as async streams

mod core;
mod interactive;
mod lifecycle;
mod stream;
mod structured;
mod turn;

pub use core::SessionManager;
pub use stream::TurnStreamEvent;
pub use structured::NO_OUTPUT_MESSAGE;
