//! Failure classification and per-thread backend cooldown

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, SessionError};
use crate::types::session::CooldownInfo;

use super::helpers::contains_any;

/// Maximum characters of diagnostic text kept as the cooldown reason
pub const MAX_REASON_CHARS: usize = 500;

/// Whether diagnostics point at upstream connectivity trouble
#[must_use]
pub fn is_upstream_connectivity_error(text: &str, patterns: &[String]) -> bool {
    contains_any(text, patterns)
}

#[derive(Debug, Clone)]
struct CooldownEntry {
    unavailable_until: DateTime<Utc>,
    reason: String,
}

/// Cooldown windows keyed by thread id
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: parking_lot::Mutex<HashMap<String, CooldownEntry>>,
}

impl CooldownTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject with `CooldownActive` while the thread's window is open
    ///
    /// # Errors
    /// Returns `CooldownActive` with the remaining seconds (rounded up)
    pub fn check(&self, thread_id: &str) -> Result<()> {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(thread_id) else {
            return Ok(());
        };
        let remaining_ms = (entry.unavailable_until - Utc::now()).num_milliseconds();
        if remaining_ms <= 0 {
            return Ok(());
        }
        let remaining_ms = u64::try_from(remaining_ms).unwrap_or(u64::MAX);
        Err(SessionError::CooldownActive {
            remaining_secs: remaining_ms.div_ceil(1000),
            reason: Some(entry.reason.clone()).filter(|r| !r.is_empty()),
        })
    }

    /// Open a window of `window` for `thread_id`
    pub fn open(&self, thread_id: &str, reason: &str, window: Duration) {
        let until = Utc::now()
            + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(30));
        let reason: String = reason.trim().chars().take(MAX_REASON_CHARS).collect();
        log::warn!(
            "[{thread_id}] Codex backend unavailable, cooling down for {}ms: {reason}",
            window.as_millis()
        );
        self.entries.lock().insert(
            thread_id.to_string(),
            CooldownEntry {
                unavailable_until: until,
                reason,
            },
        );
    }

    /// Remove the thread's window
    pub fn clear(&self, thread_id: &str) {
        if self.entries.lock().remove(thread_id).is_some() {
            log::info!("[{thread_id}] Codex backend cooldown cleared");
        }
    }

    /// Active window for the thread, if any
    #[must_use]
    pub fn get(&self, thread_id: &str) -> Option<CooldownInfo> {
        let entries = self.entries.lock();
        let entry = entries.get(thread_id)?;
        if entry.unavailable_until <= Utc::now() {
            return None;
        }
        Some(CooldownInfo {
            unavailable_until: entry.unavailable_until,
            reason: entry.reason.clone(),
        })
    }
}
