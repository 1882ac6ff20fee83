//! Per-session turn serialization
//!
//! Each queue holds one completion handle for the most recently enqueued
//! turn. Enqueueing swaps in a new handle and makes the new turn wait for the
//! old one, so turns run strictly in enqueue order. A turn releases its
//! successor whether it succeeds, fails, or is dropped.

use std::future::Future;

use tokio::sync::oneshot;

/// Promise-chain queue of turns for one session
#[derive(Debug, Default)]
pub struct TurnQueue {
    tail: parking_lot::Mutex<Option<oneshot::Receiver<()>>>,
}

impl TurnQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `task` to the queue
    ///
    /// The position is taken when this method is called, not when the
    /// returned future is first polled.
    pub fn enqueue<F, T>(&self, task: F) -> impl Future<Output = T> + Send + 'static
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.tail.lock().replace(done_rx);
        let mut release = Release {
            previous,
            done: Some(done_tx),
        };

        async move {
            if let Some(previous) = release.previous.as_mut() {
                // Err means the predecessor was dropped, which also releases us.
                let _ = previous.await;
            }
            release.previous = None;
            let result = task.await;
            drop(release);
            result
        }
    }
}

/// Signals the next turn when dropped
struct Release {
    previous: Option<oneshot::Receiver<()>>,
    done: Option<oneshot::Sender<()>>,
}

impl Drop for Release {
    fn drop(&mut self) {
        let Some(done) = self.done.take() else {
            return;
        };
        match (self.previous.take(), tokio::runtime::Handle::try_current()) {
            // Dropped while still waiting: hand the wait over so order is kept.
            (Some(previous), Ok(handle)) => {
                handle.spawn(async move {
                    let _ = previous.await;
                    let _ = done.send(());
                });
            }
            _ => {
                let _ = done.send(());
            }
        }
    }
}
