//! Turns exposed as async streams for server-sent event relays

use std::path::Path;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::session::{TurnOutput, TurnRequest};

use super::core::SessionManager;

/// One event of a streamed turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnStreamEvent {
    /// Incremental output
    Chunk {
        /// Chunk text
        text: String,
    },
    /// Turn finished successfully; always the last event
    Completed {
        /// Final output
        output: String,
    },
    /// Turn failed; always the last event
    Failed {
        /// Error kind (see `SessionError::kind`)
        kind: String,
        /// Human-readable error
        message: String,
    },
}

enum Step {
    Chunk(String),
    Done(Result<TurnOutput>),
}

impl SessionManager {
    /// Run a turn and yield its chunks followed by one terminal event
    ///
    /// The turn is queued immediately, as with
    /// [`continue_turn`](Self::continue_turn). Any `on_chunk` callback on
    /// `request` is still invoked.
    pub fn stream_turn(
        &self,
        thread_id: &str,
        cwd: impl AsRef<Path>,
        request: TurnRequest,
    ) -> impl Stream<Item = TurnStreamEvent> + Send + 'static {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let previous = request.on_chunk.clone();
        let request = request.on_chunk(move |text| {
            if let Some(ref callback) = previous {
                callback(text);
            }
            let _ = tx.send(text.to_string());
        });
        let mut turn = self.continue_turn(thread_id, cwd, request);

        async_stream::stream! {
            loop {
                let step = tokio::select! {
                    biased;
                    Some(text) = rx.recv() => Step::Chunk(text),
                    result = &mut turn => Step::Done(result),
                };
                match step {
                    Step::Chunk(text) => yield TurnStreamEvent::Chunk { text },
                    Step::Done(result) => {
                        while let Ok(text) = rx.try_recv() {
                            yield TurnStreamEvent::Chunk { text };
                        }
                        match result {
                            Ok(output) => yield TurnStreamEvent::Completed { output: output.output },
                            Err(e) => yield TurnStreamEvent::Failed {
                                kind: e.kind().to_string(),
                                message: e.to_string(),
                            },
                        }
                        break;
                    }
                }
            }
        }
    }
}
