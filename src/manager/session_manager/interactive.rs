//! Interactive turn execution against a persistent transport

use tokio::time::Instant;

use crate::error::{SessionError, bounded_tail};
use crate::message::{ParserEvent, parser_for};
use crate::transport::{
    OutputStream, TransportCapabilities, TransportEvent, TransportExit, TransportHandle,
};
use crate::types::options::SessionMode;
use crate::types::session::{TurnOutput, TurnRequest};

use super::super::completion::{Completion, CompletionDetector};
use super::super::cooldown::{MAX_REASON_CHARS, is_upstream_connectivity_error};
use super::super::helpers::{EchoFilter, contains_any};
use super::super::session::SessionRecord;
use super::core::SessionManager;

/// Result of an interactive turn
pub(super) enum InteractiveOutcome {
    /// The turn finished on this transport
    Finished(crate::error::Result<TurnOutput>),
    /// The CLI rejected the terminal; rerun the turn one-shot
    Downgrade,
}

impl SessionManager {
    pub(super) async fn run_interactive(
        &self,
        record: &SessionRecord,
        transport: &TransportHandle,
        prompt: &str,
        request: &TurnRequest,
    ) -> InteractiveOutcome {
        let thread_id = record.thread_id.as_str();
        let patterns = &self.inner.options.incompatibility_patterns;
        let cancel = request.cancel.clone().unwrap_or_default();

        if cancel.is_cancelled() {
            return InteractiveOutcome::Finished(Err(SessionError::TurnAborted));
        }

        // Subscribe before checking the exit watch so an exit cannot slip between them.
        let mut events = transport.subscribe();
        let exit_rx = transport.exit_watch();
        let exited = exit_rx.borrow().clone();
        if let Some(exit) = exited {
            return self.exited_mid_turn(record, exit, "");
        }

        let line = format!("{prompt}{}", transport.line_terminator());
        if let Err(e) = transport.write(&line) {
            let exited = exit_rx.borrow().clone();
            return match exited {
                Some(exit) => self.exited_mid_turn(record, exit, ""),
                None => InteractiveOutcome::Finished(Err(e)),
            };
        }

        let mut parser = parser_for(SessionMode::Interactive, false);
        let mut echo = if transport
            .capabilities()
            .contains(TransportCapabilities::TERMINAL)
        {
            EchoFilter::new(prompt)
        } else {
            EchoFilter::disabled()
        };
        let mut detector = CompletionDetector::start(request.timeout, request.idle);
        let mut output = String::new();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    if let Err(e) = transport.interrupt() {
                        log::debug!("[{thread_id}] interrupt failed: {e}");
                    }
                    log::debug!("[{thread_id}] turn aborted by caller");
                    return InteractiveOutcome::Finished(Err(SessionError::TurnAborted));
                }
                () = tokio::time::sleep_until(detector.next_deadline()) => {
                    match detector.check(Instant::now()) {
                        Some(Completion::Idle) => {
                            let held = echo.finish();
                            if !held.is_empty() {
                                for parsed in parser.push(OutputStream::Stdout, &held) {
                                    if let ParserEvent::Text(chunk) = parsed {
                                        output.push_str(&chunk);
                                        request.emit(&chunk);
                                    }
                                }
                            }
                            return InteractiveOutcome::Finished(Ok(TurnOutput {
                                output: output.trim().to_string(),
                            }));
                        }
                        Some(Completion::HardTimeout) => {
                            // Stop generation so the next queued turn starts clean.
                            if let Err(e) = transport.interrupt() {
                                log::debug!("[{thread_id}] interrupt failed: {e}");
                            }
                            let timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);
                            let tail = recent_output(record, &output);
                            return InteractiveOutcome::Finished(Err(SessionError::turn_timeout(
                                timeout_ms, &tail,
                            )));
                        }
                        None => {}
                    }
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Data { stream, text }) => {
                        // Any output, including the echo, counts as activity.
                        detector.on_chunk();
                        let text = echo.push(&text);
                        if text.is_empty() {
                            continue;
                        }
                        for parsed in parser.push(stream, &text) {
                            if let ParserEvent::Text(chunk) = parsed {
                                output.push_str(&chunk);
                                request.emit(&chunk);
                            }
                        }
                        if contains_any(&output, patterns) {
                            return InteractiveOutcome::Downgrade;
                        }
                    }
                    Some(TransportEvent::Exited(exit)) => {
                        return self.exited_mid_turn(record, exit, &output);
                    }
                    None => {
                        let exit = exit_rx.borrow().clone().unwrap_or_default();
                        return self.exited_mid_turn(record, exit, &output);
                    }
                },
            }
        }
    }

    fn exited_mid_turn(
        &self,
        record: &SessionRecord,
        exit: TransportExit,
        output: &str,
    ) -> InteractiveOutcome {
        let options = &self.inner.options;
        let thread_id = record.thread_id.as_str();
        let tail = recent_output(record, output);

        if contains_any(&tail, &options.incompatibility_patterns) {
            return InteractiveOutcome::Downgrade;
        }

        if is_upstream_connectivity_error(&tail, &options.upstream_patterns) {
            let reason = bounded_tail(tail.trim(), MAX_REASON_CHARS);
            self.inner.cooldowns.open(thread_id, &reason, options.cooldown);
        }

        log::warn!(
            "[{thread_id}] Codex process exited mid-turn (exitCode={:?}, signal={:?})",
            exit.exit_code,
            exit.signal
        );
        InteractiveOutcome::Finished(Err(SessionError::process_exited(
            exit.exit_code,
            exit.signal,
            &tail,
        )))
    }
}

/// Record tail, or the turn's own output if the pump has not caught up
fn recent_output(record: &SessionRecord, output: &str) -> String {
    let tail = record.tail();
    if tail.trim().is_empty() || (!output.is_empty() && !tail.contains(output.trim())) {
        output.to_string()
    } else {
        tail
    }
}
