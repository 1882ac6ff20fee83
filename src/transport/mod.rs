//! Transport layer for driving the Codex CLI process
//!
//! A [`Transport`] is a handle to one running process. It is produced by a
//! [`TransportFactory`], which prefers a pseudo-terminal and falls back to
//! plain pipes. One-shot invocations use the same handle type.
//!
//! Output is published through an [`EventHub`]: every subscriber gets its
//! own unbounded queue of [`TransportEvent`]s, so a slow reader never loses
//! output. The final event on every queue is [`TransportEvent::Exited`], sent
//! after all output has been delivered. The same exit status is also
//! observable through a watch channel for callers that subscribe late.

pub mod command;
pub mod env;
pub mod factory;
pub mod pipe;
pub mod pty;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::Result;

pub use command::{LaunchCommand, find_cli};
pub use factory::{ProcessTransportFactory, PtySpawner, TransportFactory};
pub use pipe::PipeTransport;
pub use pty::PtyTransport;

/// Interrupt byte written to cancel the in-flight generation (Ctrl-C)
pub const INTERRUPT: &str = "\u{3}";

// ============================================================================
// Events
// ============================================================================

/// Which output stream a chunk was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output (the only stream a pseudo-terminal has)
    Stdout,
    /// Standard error
    Stderr,
}

/// How the process terminated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportExit {
    /// Exit code if the process exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal name, if known
    pub signal: Option<String>,
}

impl TransportExit {
    /// Whether the process exited with code 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One event published by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Decoded output chunk
    Data {
        /// Source stream
        stream: OutputStream,
        /// Chunk text
        text: String,
    },
    /// Process exited; no further events follow
    Exited(TransportExit),
}

// ============================================================================
// Kinds and capabilities
// ============================================================================

/// Transport implementation backing a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Pseudo-terminal backed persistent process
    Pty,
    /// Pipe backed persistent process
    Pipe,
    /// Fresh process per turn
    OneShot,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pty => write!(f, "pty"),
            Self::Pipe => write!(f, "pipe"),
            Self::OneShot => write!(f, "one_shot"),
        }
    }
}

bitflags! {
    /// Operations a transport supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TransportCapabilities: u8 {
        /// Accepts input
        const WRITE = 1 << 0;
        /// Can be killed
        const KILL = 1 << 1;
        /// Understands the interrupt byte
        const INTERRUPT = 1 << 2;
        /// Child sees a real terminal
        const TERMINAL = 1 << 3;
        /// Survives across turns
        const PERSISTENT = 1 << 4;
    }
}

// ============================================================================
// Transport trait
// ============================================================================

/// Handle to one running process
///
/// All methods are synchronous: writes are queued to a writer task and kills
/// are signalled, so the handle can be used from any context.
pub trait Transport: Send + Sync {
    /// Implementation kind
    fn kind(&self) -> TransportKind;

    /// Operating-system process id, when known
    fn pid(&self) -> Option<u32>;

    /// Supported operations
    fn capabilities(&self) -> TransportCapabilities;

    /// Queue text for the process input
    ///
    /// # Errors
    /// Returns error if the transport has no input or the process is gone
    fn write(&self, text: &str) -> Result<()>;

    /// Terminate the process (best-effort)
    ///
    /// # Errors
    /// Returns error if the kill signal could not be delivered
    fn kill(&self) -> Result<()>;

    /// Subscribe to output and exit events
    ///
    /// The first subscription receives every event since spawn; later
    /// subscriptions receive events from the moment they subscribe. A
    /// subscription taken after the exit is already closed.
    fn subscribe(&self) -> EventReceiver;

    /// Watch the exit status (`None` while running)
    fn exit_watch(&self) -> watch::Receiver<Option<TransportExit>>;

    /// Write the interrupt byte
    ///
    /// # Errors
    /// Returns error if the write fails
    fn interrupt(&self) -> Result<()> {
        self.write(INTERRUPT)
    }

    /// Line terminator that submits a prompt
    fn line_terminator(&self) -> &'static str {
        if self.capabilities().contains(TransportCapabilities::TERMINAL) {
            "\r"
        } else {
            "\n"
        }
    }

    /// Whether the process has exited
    fn has_exited(&self) -> bool {
        self.exit_watch().borrow().is_some()
    }
}

/// Shared transport handle
pub type TransportHandle = Arc<dyn Transport>;

// ============================================================================
// Shared plumbing
// ============================================================================

/// Receiving end of a transport subscription
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Lossless fan-out of transport events to any number of subscribers
///
/// The queue created with the hub is handed to the first subscriber, so
/// output produced between spawn and the first `subscribe` call is kept.
/// Subscribers that drop their receiver are pruned on the next publish.
#[derive(Clone)]
pub struct EventHub {
    shared: Arc<HubShared>,
}

struct HubShared {
    subscribers: Mutex<Subscribers>,
    exit_tx: watch::Sender<Option<TransportExit>>,
}

struct Subscribers {
    senders: Vec<mpsc::UnboundedSender<TransportEvent>>,
    initial: Option<EventReceiver>,
    closed: bool,
}

impl EventHub {
    /// Create a hub with no exit status
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (exit_tx, _) = watch::channel(None);
        Self {
            shared: Arc::new(HubShared {
                subscribers: Mutex::new(Subscribers {
                    senders: vec![tx],
                    initial: Some(rx),
                    closed: false,
                }),
                exit_tx,
            }),
        }
    }

    /// Deliver an output chunk to every subscriber
    pub fn publish(&self, stream: OutputStream, text: String) {
        let mut subscribers = self.shared.subscribers.lock();
        if subscribers.closed {
            return;
        }
        let event = TransportEvent::Data { stream, text };
        subscribers
            .senders
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Publish the exit status and close every subscription
    ///
    /// The watch is updated before the in-band event. Only the first call
    /// has an effect.
    pub fn publish_exit(&self, exit: TransportExit) {
        let mut subscribers = self.shared.subscribers.lock();
        if subscribers.closed {
            return;
        }
        subscribers.closed = true;
        self.shared.exit_tx.send_replace(Some(exit.clone()));
        for tx in subscribers.senders.drain(..) {
            let _ = tx.send(TransportEvent::Exited(exit.clone()));
        }
    }

    /// New subscription (see [`Transport::subscribe`])
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        let mut subscribers = self.shared.subscribers.lock();
        if let Some(rx) = subscribers.initial.take() {
            return rx;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        if !subscribers.closed {
            subscribers.senders.push(tx);
        }
        rx
    }

    /// Watch the exit status
    #[must_use]
    pub fn exit_watch(&self) -> watch::Receiver<Option<TransportExit>> {
        self.shared.exit_tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental UTF-8 decoder that carries split code points across reads
#[derive(Debug, Default)]
pub(crate) struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let out = text.to_string();
                self.pending.clear();
                out
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let out = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                out
            }
            Err(_) => {
                let out = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                out
            }
        }
    }

    pub(crate) fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}

/// Conventional name for a Unix signal number
#[must_use]
pub fn signal_name(signal: i32) -> String {
    match signal {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        3 => "SIGQUIT".to_string(),
        6 => "SIGABRT".to_string(),
        9 => "SIGKILL".to_string(),
        13 => "SIGPIPE".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("SIG{other}"),
    }
}
