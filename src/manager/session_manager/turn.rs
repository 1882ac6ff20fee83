//! Turn orchestration: validation, cooldown, queueing and dispatch

use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use crate::error::{Result, SessionError};
use crate::types::identifiers::TurnId;
use crate::types::session::{TurnOutput, TurnRequest};

use super::super::session::SessionRecord;
use super::core::SessionManager;
use super::interactive::InteractiveOutcome;

impl SessionManager {
    /// Submit a prompt as the next turn for `thread_id`
    ///
    /// Validation, the cooldown check, session acquisition and queueing all
    /// happen before this method returns, so turns run in call order even if
    /// the returned futures are polled in a different order. Dropping the
    /// returned future abandons the turn and releases the queue.
    ///
    /// # Errors
    /// The future resolves to `Validation` or `CooldownActive` without touching
    /// any process, `StartupFailure` if no transport can be acquired, or the
    /// turn's own failure.
    pub fn continue_turn(
        &self,
        thread_id: &str,
        cwd: impl AsRef<Path>,
        request: TurnRequest,
    ) -> BoxFuture<'static, Result<TurnOutput>> {
        let prompt = request.prompt.trim().to_string();
        if prompt.is_empty() {
            return future::ready(Err(SessionError::validation("prompt must not be empty")))
                .boxed();
        }

        if let Err(e) = self.inner.cooldowns.check(thread_id) {
            return future::ready(Err(e)).boxed();
        }

        let record = match self.ensure_session(thread_id, cwd.as_ref()) {
            Ok((_, record)) => record,
            Err(e) => {
                log::warn!("[{thread_id}] Failed to start Codex session: {e}");
                return future::ready(Err(e)).boxed();
            }
        };

        let manager = self.clone();
        let task = {
            let record = Arc::clone(&record);
            async move { manager.execute_turn(record, prompt, request).await }
        };
        record.queue.enqueue(task).boxed()
    }

    async fn execute_turn(
        &self,
        record: Arc<SessionRecord>,
        prompt: String,
        request: TurnRequest,
    ) -> Result<TurnOutput> {
        let thread_id = record.thread_id.clone();
        let turn = TurnId::new();
        log::debug!("[{thread_id}] turn {} started", turn.short());

        let transport = record.state.lock().transport.clone();
        let result = match transport {
            Some(transport) if !self.inner.uses_one_shot(&thread_id) => {
                match self.run_interactive(&record, &transport, &prompt, &request).await {
                    InteractiveOutcome::Finished(result) => result,
                    InteractiveOutcome::Downgrade => {
                        self.downgrade(&record);
                        self.run_one_shot(&record, &prompt, &request).await
                    }
                }
            }
            Some(_) => {
                self.downgrade(&record);
                self.run_one_shot(&record, &prompt, &request).await
            }
            None => self.run_one_shot(&record, &prompt, &request).await,
        };

        record.touch();
        match result {
            Ok(ref output) => {
                self.inner.cooldowns.clear(&thread_id);
                log::debug!(
                    "[{thread_id}] turn {} completed ({} chars)",
                    turn.short(),
                    output.output.chars().count()
                );
            }
            Err(ref e) => {
                log::debug!("[{thread_id}] turn {} failed: {}", turn.short(), e.kind());
            }
        }
        result
    }

    /// Mark the thread one-shot and retire its persistent transport
    fn downgrade(&self, record: &SessionRecord) {
        self.inner.mark_one_shot(&record.thread_id);
        if let Some(transport) = record.detach_transport()
            && let Err(e) = transport.kill()
        {
            log::debug!("[{}] kill after downgrade failed: {e}", record.thread_id);
        }
    }
}
