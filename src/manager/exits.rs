//! Last-exit diagnostics per thread
//!
//! Entries outlive the session record so `status` can explain a crash.

use std::collections::HashMap;

use crate::types::session::ExitInfo;

/// Most recent [`ExitInfo`] per thread id
#[derive(Debug, Default)]
pub struct ExitTracker {
    exits: parking_lot::Mutex<HashMap<String, ExitInfo>>,
}

impl ExitTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `info`, replacing any earlier exit for the same thread
    pub fn record(&self, info: ExitInfo) {
        self.exits.lock().insert(info.thread_id.clone(), info);
    }

    /// Last exit for `thread_id`
    #[must_use]
    pub fn get(&self, thread_id: &str) -> Option<ExitInfo> {
        self.exits.lock().get(thread_id).cloned()
    }
}
