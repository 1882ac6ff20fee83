//! Session state structures
//!
//! A [`SessionRecord`] is shared between the manager map, the output pump and
//! in-flight turns. Immutable identity lives on the record; everything that
//! changes over its lifetime sits behind one short-lived lock.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::transport::{TransportHandle, TransportKind};
use crate::types::identifiers::RemoteSessionId;

use super::helpers::OutputTail;
use super::queue::TurnQueue;

/// One live session for a thread
pub(crate) struct SessionRecord {
    /// Thread this record belongs to
    pub thread_id: String,

    /// Distinguishes this record from later records for the same thread
    pub id: u64,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// Serializes turns for this thread
    pub queue: TurnQueue,

    /// Mutable state
    pub state: parking_lot::Mutex<SessionState>,
}

/// Mutable part of a [`SessionRecord`]
pub(crate) struct SessionState {
    /// Working directory for spawned processes
    pub cwd: PathBuf,

    /// Persistent transport (`None` in one-shot mode)
    pub transport: Option<TransportHandle>,

    /// Bumped whenever `transport` is replaced
    pub transport_epoch: u64,

    /// Transport kind the record currently uses
    pub transport_kind: TransportKind,

    /// One-shot process of the in-flight turn, killed by `stop`
    pub active_one_shot: Option<TransportHandle>,

    /// Last time a turn or start call touched the record
    pub last_used_at: DateTime<Utc>,

    /// Resumable id issued by the CLI
    pub remote_session_id: Option<RemoteSessionId>,

    /// Recent output
    pub tail: OutputTail,
}

impl SessionRecord {
    /// Create a record around an optional persistent transport
    pub fn new(thread_id: &str, id: u64, cwd: PathBuf, transport: Option<TransportHandle>) -> Self {
        let now = Utc::now();
        let transport_kind = transport
            .as_ref()
            .map_or(TransportKind::OneShot, |t| t.kind());
        Self {
            thread_id: thread_id.to_string(),
            id,
            created_at: now,
            queue: TurnQueue::new(),
            state: parking_lot::Mutex::new(SessionState {
                cwd,
                transport,
                transport_epoch: 0,
                transport_kind,
                active_one_shot: None,
                last_used_at: now,
                remote_session_id: None,
                tail: OutputTail::new(),
            }),
        }
    }

    /// Refresh `last_used_at`
    pub fn touch(&self) {
        self.state.lock().last_used_at = Utc::now();
    }

    /// Append output to the tail
    pub fn push_tail(&self, text: &str) {
        self.state.lock().tail.push(text);
    }

    /// Snapshot of the tail
    pub fn tail(&self) -> String {
        self.state.lock().tail.snapshot()
    }

    /// Process id of the persistent transport
    pub fn pid(&self) -> Option<u32> {
        self.state.lock().transport.as_ref().and_then(|t| t.pid())
    }

    /// Drop the persistent transport and switch to one-shot turns
    ///
    /// Returns the transport that was detached, if any.
    pub fn detach_transport(&self) -> Option<TransportHandle> {
        let mut state = self.state.lock();
        state.transport_epoch += 1;
        state.transport_kind = TransportKind::OneShot;
        state.transport.take()
    }

    /// Kill every process owned by the record
    pub fn kill_all(&self) {
        let (transport, one_shot) = {
            let mut state = self.state.lock();
            (state.transport.clone(), state.active_one_shot.take())
        };
        for handle in transport.iter().chain(one_shot.iter()) {
            if let Err(e) = handle.kill() {
                log::debug!("[{}] kill failed: {e}", self.thread_id);
            }
        }
    }
}
