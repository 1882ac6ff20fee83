//! One-shot turn execution: a fresh `codex exec --json` process per turn

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{ERROR_TAIL_CHARS, Result, SessionError, bounded_tail};
use crate::message::{ParserEvent, parser_for};
use crate::transport::{LaunchCommand, TransportEvent, TransportExit, TransportHandle};
use crate::types::identifiers::RemoteSessionId;
use crate::types::options::SessionMode;
use crate::types::session::{ExitInfo, TurnOutput, TurnRequest};

use super::super::cooldown::is_upstream_connectivity_error;
use super::super::helpers::{OutputTail, last_lines};
use super::super::session::SessionRecord;
use super::core::SessionManager;

/// Result text when a successful invocation produced nothing
pub const NO_OUTPUT_MESSAGE: &str = "Codex prompt completed with no output.";

/// Diagnostics lines embedded in a failure
const FAILURE_DIAGNOSTIC_LINES: usize = 20;

/// Diagnostics lines used as output when no assistant text arrived
const FALLBACK_DIAGNOSTIC_LINES: usize = 10;

#[derive(Default)]
struct OneShotTurn {
    messages: Vec<String>,
    diagnostics: Vec<String>,
    tail: OutputTail,
}

impl SessionManager {
    pub(super) async fn run_one_shot(
        &self,
        record: &SessionRecord,
        prompt: &str,
        request: &TurnRequest,
    ) -> Result<TurnOutput> {
        let thread_id = record.thread_id.as_str();
        let cancel = request.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(SessionError::TurnAborted);
        }

        let (cwd, remote_id) = {
            let state = record.state.lock();
            (state.cwd.clone(), state.remote_session_id.clone())
        };
        let remote_id = remote_id.as_ref().map(RemoteSessionId::as_str);
        let command = LaunchCommand::one_shot(&self.inner.options, &cwd, remote_id, prompt);
        log::debug!(
            "[{thread_id}] running one-shot Codex (resume={})",
            remote_id.unwrap_or("none")
        );

        let transport = match self.inner.factory.spawn_one_shot(&command) {
            Ok(transport) => transport,
            Err(e) => {
                self.inner.exits.record(ExitInfo {
                    thread_id: thread_id.to_string(),
                    cwd,
                    exit_code: None,
                    signal: None,
                    output_tail: String::new(),
                    exited_at: Utc::now(),
                });
                return Err(e);
            }
        };

        record.state.lock().active_one_shot = Some(transport.clone());
        let result = self
            .drive_one_shot(record, &transport, request, &cancel)
            .await;
        record.state.lock().active_one_shot = None;
        result
    }

    async fn drive_one_shot(
        &self,
        record: &SessionRecord,
        transport: &TransportHandle,
        request: &TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnOutput> {
        let options = &self.inner.options;
        let thread_id = record.thread_id.as_str();

        let mut events = transport.subscribe();
        let exit_rx = transport.exit_watch();
        let mut parser = parser_for(SessionMode::Structured, options.include_reasoning);
        let mut turn = OneShotTurn::default();

        let hard = tokio::time::sleep(request.timeout);
        tokio::pin!(hard);

        let exit = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = transport.kill();
                    log::debug!("[{thread_id}] one-shot turn aborted by caller");
                    return Err(SessionError::TurnAborted);
                }
                () = &mut hard => {
                    let _ = transport.kill();
                    let timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);
                    return Err(SessionError::turn_timeout(timeout_ms, turn.tail.as_str()));
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Data { stream, text }) => {
                        for parsed in parser.push(stream, &text) {
                            apply(record, request, &mut turn, parsed);
                        }
                    }
                    Some(TransportEvent::Exited(exit)) => break exit,
                    None => break exit_rx.borrow().clone().unwrap_or_default(),
                },
            }
        };

        for parsed in parser.finish() {
            apply(record, request, &mut turn, parsed);
        }

        self.inner.exits.record(ExitInfo {
            thread_id: thread_id.to_string(),
            cwd: record.state.lock().cwd.clone(),
            exit_code: exit.exit_code,
            signal: exit.signal.clone(),
            output_tail: turn.tail.snapshot(),
            exited_at: Utc::now(),
        });

        if !exit.success() {
            return Err(self.classify_failure(thread_id, &exit, &turn));
        }

        let output = turn.messages.join("\n\n").trim().to_string();
        if !output.is_empty() {
            return Ok(TurnOutput { output });
        }

        let fallback = last_lines(&turn.diagnostics, FALLBACK_DIAGNOSTIC_LINES);
        Ok(TurnOutput {
            output: if fallback.is_empty() {
                NO_OUTPUT_MESSAGE.to_string()
            } else {
                fallback
            },
        })
    }

    fn classify_failure(&self, thread_id: &str, exit: &TransportExit, turn: &OneShotTurn) -> SessionError {
        let options = &self.inner.options;

        let mut details = last_lines(&turn.diagnostics, FAILURE_DIAGNOSTIC_LINES);
        if details.is_empty() {
            details = turn.tail.as_str().trim().to_string();
        }
        if details.is_empty() {
            details = match (exit.exit_code, exit.signal.as_deref()) {
                (Some(code), _) => format!("Codex exited with code {code}"),
                (None, Some(signal)) => format!("Codex exited with signal {signal}"),
                (None, None) => "Codex exited with unknown status".to_string(),
            };
        }

        if is_upstream_connectivity_error(&details, &options.upstream_patterns) {
            self.inner.cooldowns.open(thread_id, &details, options.cooldown);
            return SessionError::UpstreamFailure {
                exit_code: exit.exit_code,
                details: bounded_tail(&details, ERROR_TAIL_CHARS),
            };
        }

        log::debug!(
            "[{thread_id}] one-shot Codex failed (exitCode={:?}) with no upstream signature",
            exit.exit_code
        );
        SessionError::UnknownFailure {
            exit_code: exit.exit_code,
            details: bounded_tail(&details, ERROR_TAIL_CHARS),
        }
    }
}

fn apply(record: &SessionRecord, request: &TurnRequest, turn: &mut OneShotTurn, event: ParserEvent) {
    match event {
        ParserEvent::SessionStarted(id) => {
            log::debug!("[{}] Codex issued resumable id {id}", record.thread_id);
            record.state.lock().remote_session_id = Some(RemoteSessionId::from(id));
        }
        ParserEvent::Assistant(text) => {
            request.emit(&text);
            let line = format!("{text}\n");
            turn.tail.push(&line);
            record.push_tail(&line);
            turn.messages.push(text);
        }
        ParserEvent::Diagnostic(text) => {
            let line = format!("{text}\n");
            turn.tail.push(&line);
            record.push_tail(&line);
            turn.diagnostics.push(text);
        }
        ParserEvent::Text(_) => {}
    }
}
