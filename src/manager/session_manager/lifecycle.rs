//! Session lifecycle: start, status, stop, shutdown, list

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::Utc;

use crate::error::Result;
use crate::transport::{LaunchCommand, TransportEvent, TransportHandle};
use crate::types::session::{AbsentStatus, RunningStatus, SessionStatus, StartResult, StopResult};

use super::super::session::SessionRecord;
use super::core::{ManagerInner, SessionManager};

impl SessionManager {
    /// Ensure a session exists for `thread_id`
    ///
    /// An existing session is refreshed (and its working directory updated)
    /// and reported with `started: false`. Acquisition failures are reported
    /// through `error` with `running: false`.
    pub fn start(&self, thread_id: &str, cwd: impl AsRef<Path>) -> StartResult {
        let cwd = cwd.as_ref().to_path_buf();
        match self.ensure_session(thread_id, &cwd) {
            Ok((result, _)) => result,
            Err(e) => {
                log::warn!("[{thread_id}] Failed to start Codex session: {e}");
                StartResult {
                    started: false,
                    running: false,
                    thread_id: thread_id.to_string(),
                    cwd,
                    pid: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub(super) fn ensure_session(
        &self,
        thread_id: &str,
        cwd: &Path,
    ) -> Result<(StartResult, Arc<SessionRecord>)> {
        let inner = &self.inner;

        {
            let mut sessions = inner.sessions.lock();
            if let Some(record) = sessions.get(thread_id) {
                return Ok(refresh(thread_id, cwd, record));
            }
            if inner.uses_one_shot(thread_id) {
                let record = Arc::new(SessionRecord::new(
                    thread_id,
                    inner.next_record_id(),
                    cwd.to_path_buf(),
                    None,
                ));
                sessions.insert(thread_id.to_string(), Arc::clone(&record));
                log::info!(
                    "[{thread_id}] Codex session ready (one-shot) in {}",
                    cwd.display()
                );
                return Ok((started(thread_id, cwd, true, None), record));
            }
        }

        // Spawning can block for a while; other threads keep using the registry.
        let command = LaunchCommand::interactive(&inner.options, cwd);
        let transport = inner.factory.acquire(&command)?;

        let mut sessions = inner.sessions.lock();
        if let Some(record) = sessions.get(thread_id) {
            log::debug!("[{thread_id}] session registered concurrently, discarding new process");
            let _ = transport.kill();
            return Ok(refresh(thread_id, cwd, record));
        }

        let pid = transport.pid();
        let record = Arc::new(SessionRecord::new(
            thread_id,
            inner.next_record_id(),
            cwd.to_path_buf(),
            Some(Arc::clone(&transport)),
        ));
        spawn_output_pump(Arc::downgrade(&self.inner), Arc::clone(&record), &transport, 0);
        sessions.insert(thread_id.to_string(), Arc::clone(&record));
        drop(sessions);

        log::info!(
            "[{thread_id}] Started Codex session ({}, pid={pid:?}) in {}",
            transport.kind(),
            cwd.display()
        );
        Ok((started(thread_id, cwd, true, pid), record))
    }

    /// Report whether a session is live for `thread_id`
    #[must_use]
    pub fn status(&self, thread_id: &str) -> SessionStatus {
        let Some(record) = self.inner.current_record(thread_id) else {
            return SessionStatus::Absent(AbsentStatus {
                running: false,
                thread_id: thread_id.to_string(),
                last_exit: self.inner.exits.get(thread_id),
            });
        };

        let cooldown = self.inner.cooldowns.get(thread_id);
        let state = record.state.lock();
        SessionStatus::Running(RunningStatus {
            running: true,
            thread_id: thread_id.to_string(),
            cwd: state.cwd.clone(),
            pid: state.transport.as_ref().and_then(|t| t.pid()),
            created_at: record.created_at,
            last_used_at: state.last_used_at,
            transport_kind: state.transport_kind,
            output_tail: state.tail.snapshot(),
            remote_session_id: state.remote_session_id.clone(),
            cooldown,
        })
    }

    /// Stop the session for `thread_id` (idempotent)
    pub fn stop(&self, thread_id: &str) -> StopResult {
        let record = self.inner.sessions.lock().remove(thread_id);
        let stopped = record.is_some();
        if let Some(record) = record {
            record.kill_all();
            log::info!("[{thread_id}] Stopped Codex session");
        }
        StopResult {
            stopped,
            running: false,
            thread_id: thread_id.to_string(),
        }
    }

    /// Stop every session
    pub fn shutdown(&self) {
        let records: Vec<Arc<SessionRecord>> = {
            let mut sessions = self.inner.sessions.lock();
            sessions.drain().map(|(_, record)| record).collect()
        };
        if !records.is_empty() {
            log::info!("Shutting down {} Codex session(s)", records.len());
        }
        for record in records {
            record.kill_all();
        }
    }

    /// Thread ids with a live session, sorted
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Touch an existing record and report it as already running
fn refresh(
    thread_id: &str,
    cwd: &Path,
    record: &Arc<SessionRecord>,
) -> (StartResult, Arc<SessionRecord>) {
    let pid = {
        let mut state = record.state.lock();
        state.last_used_at = Utc::now();
        if state.cwd != cwd {
            log::info!(
                "[{thread_id}] working directory changed to {}",
                cwd.display()
            );
            state.cwd = cwd.to_path_buf();
        }
        state.transport.as_ref().and_then(|t| t.pid())
    };
    (started(thread_id, cwd, false, pid), Arc::clone(record))
}

fn started(thread_id: &str, cwd: &Path, started: bool, pid: Option<u32>) -> StartResult {
    StartResult {
        started,
        running: true,
        thread_id: thread_id.to_string(),
        cwd: PathBuf::from(cwd),
        pid,
        error: None,
    }
}

/// Feed a transport's output into the record tail and handle its exit
///
/// Holds only a weak reference to the manager so a dropped manager can kill
/// its processes.
pub(super) fn spawn_output_pump(
    inner: Weak<ManagerInner>,
    record: Arc<SessionRecord>,
    transport: &TransportHandle,
    epoch: u64,
) {
    let mut events = transport.subscribe();
    let exit_rx = transport.exit_watch();

    tokio::spawn(async move {
        let exit = loop {
            match events.recv().await {
                Some(TransportEvent::Data { text, .. }) => record.push_tail(&text),
                Some(TransportEvent::Exited(exit)) => break exit,
                None => break exit_rx.borrow().clone().unwrap_or_default(),
            }
        };
        if let Some(inner) = inner.upgrade() {
            inner.handle_exit(&record, epoch, exit);
        }
    });
}
