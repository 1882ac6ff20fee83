//! Core session manager structure
//!
//! Provides the `SessionManager` handle, its shared state, and the exit
//! handler that turns a process exit into `ExitInfo`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::transport::{ProcessTransportFactory, TransportExit, TransportFactory};
use crate::types::options::{SessionMode, SessionOptions};
use crate::types::session::ExitInfo;

use super::super::cooldown::CooldownTracker;
use super::super::exits::ExitTracker;
use super::super::helpers::contains_any;
use super::super::session::SessionRecord;

// ============================================================================
// SESSION MANAGER CORE
// ============================================================================

/// Manager for persistent Codex sessions, one per conversation thread
///
/// The `SessionManager` coordinates:
/// - Session lifecycle (start, status, stop, shutdown)
/// - Serialized prompt/response turns per thread
/// - Backend cooldown after upstream failures
/// - Last-exit diagnostics after a crash
///
/// Cloning is cheap; clones share the same sessions. Methods that spawn
/// processes must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    pub(crate) options: SessionOptions,
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) sessions: parking_lot::Mutex<HashMap<String, Arc<SessionRecord>>>,
    pub(crate) exits: ExitTracker,
    pub(crate) cooldowns: CooldownTracker,
    one_shot_threads: parking_lot::Mutex<HashSet<String>>,
    next_record_id: AtomicU64,
}

impl SessionManager {
    /// Create a manager that spawns real Codex processes
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        let factory = Arc::new(ProcessTransportFactory::new(options.pty_size));
        Self::with_factory(options, factory)
    }

    /// Create a manager using a custom transport factory
    #[must_use]
    pub fn with_factory(options: SessionOptions, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                options,
                factory,
                sessions: parking_lot::Mutex::new(HashMap::new()),
                exits: ExitTracker::new(),
                cooldowns: CooldownTracker::new(),
                one_shot_threads: parking_lot::Mutex::new(HashSet::new()),
                next_record_id: AtomicU64::new(1),
            }),
        }
    }

    /// Options the manager was created with
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Whether turns for `thread_id` run as one-shot invocations
    #[must_use]
    pub fn is_one_shot(&self, thread_id: &str) -> bool {
        self.inner.uses_one_shot(thread_id)
    }
}

impl ManagerInner {
    pub(crate) fn next_record_id(&self) -> u64 {
        self.next_record_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn uses_one_shot(&self, thread_id: &str) -> bool {
        self.options.mode == SessionMode::Structured
            || self.one_shot_threads.lock().contains(thread_id)
    }

    /// Permanently switch a thread to one-shot turns; TRUE the first time
    pub(crate) fn mark_one_shot(&self, thread_id: &str) -> bool {
        let newly = self.one_shot_threads.lock().insert(thread_id.to_string());
        if newly {
            log::info!("[{thread_id}] Codex rejected the terminal, switching to one-shot invocations");
        }
        newly
    }

    pub(crate) fn current_record(&self, thread_id: &str) -> Option<Arc<SessionRecord>> {
        self.sessions.lock().get(thread_id).cloned()
    }

    /// Handle the exit of a record's persistent transport
    ///
    /// `epoch` identifies the transport that exited; exits of transports the
    /// record has already replaced are ignored.
    pub(crate) fn handle_exit(&self, record: &SessionRecord, epoch: u64, exit: TransportExit) {
        let thread_id = record.thread_id.as_str();
        let (cwd, tail, current) = {
            let state = record.state.lock();
            (
                state.cwd.clone(),
                state.tail.snapshot(),
                state.transport_epoch == epoch,
            )
        };

        if !current {
            log::debug!("[{thread_id}] detached transport exited");
            return;
        }

        self.exits.record(ExitInfo {
            thread_id: thread_id.to_string(),
            cwd,
            exit_code: exit.exit_code,
            signal: exit.signal.clone(),
            output_tail: tail.clone(),
            exited_at: Utc::now(),
        });

        if contains_any(&tail, &self.options.incompatibility_patterns) {
            self.mark_one_shot(thread_id);
        }

        let removed = {
            let mut sessions = self.sessions.lock();
            if sessions.get(thread_id).is_some_and(|r| r.id == record.id) {
                sessions.remove(thread_id);
                true
            } else {
                false
            }
        };

        if removed {
            log::warn!(
                "[{thread_id}] Codex process exited (exitCode={:?}, signal={:?})",
                exit.exit_code,
                exit.signal
            );
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        for (_, record) in self.sessions.get_mut().drain() {
            record.kill_all();
        }
    }
}
