//! Integration tests for `SessionManager` in interactive mode
//!
//! Uses scripted in-memory transports, so no Codex binary is required.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{StubFactory, StubTransport, eventually, ndjson};
use futures::StreamExt;
use kodegen_codex_session::manager::TurnQueue;
use kodegen_codex_session::{
    SessionError, SessionManager, SessionOptions, SessionStatus, TransportKind, TurnRequest,
    TurnStreamEvent,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const IDLE: Duration = Duration::from_millis(50);

fn manager_with(factory: &Arc<StubFactory>) -> SessionManager {
    common::init_logging();
    SessionManager::with_factory(SessionOptions::default(), factory.clone())
}

fn quick(prompt: &str) -> TurnRequest {
    TurnRequest::new(prompt)
        .with_idle(IDLE)
        .with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_status_of_unknown_thread() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    let status = manager.status("nope");
    assert!(!status.is_running());
    assert!(status.last_exit().is_none());
    assert_eq!(factory.acquire_calls(), 0);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    let first = manager.start("t1", "/tmp");
    assert!(first.started);
    assert!(first.running);
    assert!(first.pid.is_some());

    let second = manager.start("t1", "/tmp");
    assert!(!second.started);
    assert!(second.running);
    assert_eq!(second.pid, first.pid);
    assert_eq!(factory.acquire_calls(), 1);

    match manager.status("t1") {
        SessionStatus::Running(running) => {
            assert_eq!(running.pid, first.pid);
            assert_eq!(running.transport_kind, TransportKind::Pipe);
            assert!(running.cooldown.is_none());
        }
        SessionStatus::Absent(_) => panic!("session should be running"),
    }
}

#[tokio::test]
async fn test_start_reports_acquisition_failure() {
    let factory = Arc::new(StubFactory::failing());
    let manager = manager_with(&factory);

    let result = manager.start("t1", "/tmp");
    assert!(!result.started);
    assert!(!result.running);
    assert!(result.error.is_some());

    let err = manager.continue_turn("t1", "/tmp", quick("hi")).await.unwrap_err();
    assert!(matches!(err, SessionError::StartupFailure(_)));
}

#[tokio::test]
async fn test_blank_prompt_is_rejected_without_spawning() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    let err = manager
        .continue_turn("t1", "/tmp", quick("   \n\t"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(err.is_precondition());
    assert_eq!(factory.acquire_calls(), 0);
    assert!(!manager.status("t1").is_running());
}

#[tokio::test]
async fn test_turn_completes_after_idle_window() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    let chunks = Arc::new(Mutex::new(Vec::new()));
    let sink = chunks.clone();
    let request = quick("  hello  ").on_chunk(move |text| sink.lock().push(text.to_string()));

    let result = manager.continue_turn("t1", "/tmp", request).await.unwrap();
    assert_eq!(result.output, "echo: hello");
    assert_eq!(chunks.lock().concat(), "echo: hello\n");

    // Prompt is trimmed and submitted with the transport's line terminator
    assert_eq!(factory.last().writes(), vec!["hello\n".to_string()]);

    assert!(eventually(Duration::from_secs(1), || {
        matches!(manager.status("t1"), SessionStatus::Running(ref s) if s.output_tail.contains("echo: hello"))
    })
    .await);
}

#[tokio::test]
async fn test_single_reply_resolves_after_idle() {
    let factory = Arc::new(StubFactory::with(|| StubTransport::replying("hello")));
    let manager = manager_with(&factory);

    let started = tokio::time::Instant::now();
    let result = tokio_test::assert_ok!(manager.continue_turn("t1", "/tmp", quick("greet")).await);
    assert_eq!(result.output, "hello");
    assert!(started.elapsed() >= IDLE);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_burst_of_output_is_delivered_whole() {
    let factory = Arc::new(StubFactory::queued(vec![StubTransport::bursting(600)]));
    let manager = manager_with(&factory);

    let chunks = Arc::new(Mutex::new(0usize));
    let counter = chunks.clone();
    let request = quick("flood").on_chunk(move |_| *counter.lock() += 1);

    let result = tokio_test::assert_ok!(manager.continue_turn("t1", "/tmp", request).await);
    let expected: String = (0..600).map(|i| format!("{i};")).collect();
    assert_eq!(result.output, expected);
    assert_eq!(*chunks.lock(), 600);
}

#[tokio::test]
async fn test_slow_thread_does_not_block_others() {
    let factory = Arc::new(StubFactory::queued(vec![
        StubTransport::silent(),
        StubTransport::echo(),
    ]));
    let manager = manager_with(&factory);

    let cancel = CancellationToken::new();
    let slow = manager.continue_turn(
        "slow",
        "/tmp",
        TurnRequest::new("think hard")
            .with_timeout(Duration::from_secs(30))
            .with_idle(IDLE)
            .with_cancel(cancel.clone()),
    );
    let slow = tokio::spawn(slow);
    assert!(eventually(Duration::from_secs(1), || !factory.acquired()[0].writes().is_empty()).await);

    let started = tokio::time::Instant::now();
    let fast = tokio_test::assert_ok!(manager.continue_turn("fast", "/tmp", quick("hi")).await);
    assert_eq!(fast.output, "echo: hi");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!slow.is_finished());

    cancel.cancel();
    let err = slow.await.expect("slow turn task");
    assert!(matches!(err, Err(SessionError::TurnAborted)));
}

#[tokio::test]
async fn test_turns_run_in_call_order() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    let first = manager.continue_turn("t1", "/tmp", quick("first"));
    let second = manager.continue_turn("t1", "/tmp", quick("second"));
    let third = manager.continue_turn("t1", "/tmp", quick("third"));

    // Polled in reverse; the queue still runs them in call order
    let (c, b, a) = tokio::join!(third, second, first);
    assert_eq!(a.unwrap().output, "echo: first");
    assert_eq!(b.unwrap().output, "echo: second");
    assert_eq!(c.unwrap().output, "echo: third");

    assert_eq!(
        factory.last().writes(),
        vec!["first\n", "second\n", "third\n"]
    );
    assert_eq!(factory.acquire_calls(), 1);
}

#[tokio::test]
async fn test_silent_process_hits_hard_timeout() {
    let factory = Arc::new(StubFactory::with(StubTransport::silent));
    let manager = manager_with(&factory);

    let request = TurnRequest::new("anyone there?")
        .with_idle(Duration::from_millis(20))
        .with_timeout(Duration::from_millis(100));
    let err = manager.continue_turn("t1", "/tmp", request).await.unwrap_err();

    assert!(matches!(err, SessionError::TurnTimeout { timeout_ms: 100, .. }));
    assert!(err.to_string().contains("timed out after 100ms"));
    // Generation is interrupted so the next turn starts clean
    assert_eq!(factory.last().writes().last().map(String::as_str), Some("\u{3}"));
    assert!(manager.status("t1").is_running());
}

#[tokio::test]
async fn test_cancel_interrupts_turn() {
    let factory = Arc::new(StubFactory::with(StubTransport::silent));
    let manager = manager_with(&factory);

    let token = CancellationToken::new();
    let request = quick("long job").with_cancel(token.clone());
    let turn = manager.continue_turn("t1", "/tmp", request);

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
    });

    let err = turn.await.unwrap_err();
    canceller.await.unwrap();
    assert!(matches!(err, SessionError::TurnAborted));
    assert_eq!(
        factory.last().writes(),
        vec!["long job\n".to_string(), "\u{3}".to_string()]
    );
    assert!(!factory.last().was_killed());
}

#[tokio::test]
async fn test_process_exit_mid_turn_records_diagnostics() {
    let factory = Arc::new(StubFactory::queued(vec![
        StubTransport::crashing("partial output\n", 3),
        StubTransport::echo(),
    ]));
    let manager = manager_with(&factory);

    let err = manager.continue_turn("t1", "/tmp", quick("go")).await.unwrap_err();
    match err {
        SessionError::ProcessExited {
            exit_code,
            ref output_tail,
            ..
        } => {
            assert_eq!(exit_code, Some(3));
            assert!(output_tail.contains("partial output"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(eventually(Duration::from_secs(1), || !manager.status("t1").is_running()).await);
    let status = manager.status("t1");
    let exit = status.last_exit().expect("exit recorded");
    assert_eq!(exit.exit_code, Some(3));
    assert!(exit.output_tail.contains("partial output"));

    // The next turn gets a fresh process
    let result = manager.continue_turn("t1", "/tmp", quick("again")).await.unwrap();
    assert_eq!(result.output, "echo: again");
    assert_eq!(factory.acquire_calls(), 2);
}

#[tokio::test]
async fn test_terminal_rejection_downgrades_once() {
    let factory = Arc::new(
        StubFactory::queued(vec![StubTransport::replying(
            "Error: stdin is not a terminal\n",
        )])
        .one_shot(|_| {
            StubTransport::finished(
                &ndjson(json!({
                    "type": "item.completed",
                    "item": {"type": "agent_message", "text": "from exec"}
                })),
                "",
                0,
            )
        }),
    );
    let manager = manager_with(&factory);

    let result = manager.continue_turn("t1", "/tmp", quick("hi")).await.unwrap();
    assert_eq!(result.output, "from exec");
    assert!(manager.is_one_shot("t1"));
    assert!(factory.acquired()[0].was_killed());
    assert_eq!(factory.acquired()[0].writes(), vec!["hi\n".to_string()]);
    assert_eq!(factory.one_shot_commands().len(), 1);

    let result = manager.continue_turn("t1", "/tmp", quick("again")).await.unwrap();
    assert_eq!(result.output, "from exec");
    assert_eq!(factory.acquire_calls(), 1);
    assert_eq!(factory.one_shot_commands().len(), 2);

    match manager.status("t1") {
        SessionStatus::Running(running) => {
            assert_eq!(running.transport_kind, TransportKind::OneShot);
            assert_eq!(running.pid, None);
        }
        SessionStatus::Absent(_) => panic!("one-shot session should stay registered"),
    }
}

#[tokio::test]
async fn test_terminal_rejection_at_startup_downgrades() {
    let stub = StubTransport::silent();
    stub.emit("Error: raw mode is not supported on this terminal\n");
    stub.exit(Some(1), None);

    let factory = Arc::new(StubFactory::queued(vec![stub]).one_shot(|_| {
        StubTransport::finished(
            &ndjson(json!({
                "type": "item.completed",
                "item": {"type": "agent_message", "text": "one-shot reply"}
            })),
            "",
            0,
        )
    }));
    let manager = manager_with(&factory);

    assert!(manager.start("t1", "/tmp").started);
    assert!(eventually(Duration::from_secs(1), || !manager.status("t1").is_running()).await);
    assert!(manager.is_one_shot("t1"));
    assert_eq!(manager.status("t1").last_exit().and_then(|e| e.exit_code), Some(1));

    let result = tokio_test::assert_ok!(manager.continue_turn("t1", "/tmp", quick("hi")).await);
    assert_eq!(result.output, "one-shot reply");
    assert_eq!(factory.acquire_calls(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    manager.start("t1", "/tmp");
    let stopped = manager.stop("t1");
    assert!(stopped.stopped);
    assert!(!stopped.running);
    assert!(factory.last().was_killed());

    let again = manager.stop("t1");
    assert!(!again.stopped);
    assert!(!again.running);
    assert!(!manager.status("t1").is_running());
}

#[tokio::test]
async fn test_list_and_shutdown() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    manager.start("b", "/tmp");
    manager.start("a", "/tmp");
    assert_eq!(manager.list(), vec!["a", "b"]);

    manager.shutdown();
    assert!(manager.list().is_empty());
    assert!(factory.acquired().iter().all(|t| t.was_killed()));
}

#[tokio::test]
async fn test_stream_turn_yields_chunks_then_completion() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    let events: Vec<TurnStreamEvent> = manager
        .stream_turn("t1", "/tmp", quick("hi"))
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            TurnStreamEvent::Chunk {
                text: "echo: hi\n".into()
            },
            TurnStreamEvent::Completed {
                output: "echo: hi".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_stream_turn_reports_failure_kind() {
    let factory = Arc::new(StubFactory::with(StubTransport::echo));
    let manager = manager_with(&factory);

    let events: Vec<TurnStreamEvent> = manager.stream_turn("t1", "/tmp", quick(" ")).collect().await;
    assert!(matches!(
        events.as_slice(),
        [TurnStreamEvent::Failed { kind, .. }] if kind == "validation"
    ));
}

#[tokio::test]
async fn test_queue_keeps_order_when_a_turn_is_dropped() {
    let queue = TurnQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let first = {
        let log = log.clone();
        queue.enqueue(async move {
            let _ = release_rx.await;
            log.lock().push("first");
        })
    };
    let dropped = queue.enqueue(async {});
    let third = {
        let log = log.clone();
        queue.enqueue(async move { log.lock().push("third") })
    };
    drop(dropped);

    let first = tokio::spawn(first);
    let third = tokio::spawn(third);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(log.lock().is_empty());

    release_tx.send(()).unwrap();
    first.await.unwrap();
    third.await.unwrap();
    assert_eq!(*log.lock(), vec!["first", "third"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_spawn_does_not_block_other_threads() {
    let (factory, release) = StubFactory::held(StubTransport::echo);
    let factory = Arc::new(factory);
    let manager = manager_with(&factory);

    let starter = {
        let manager = manager.clone();
        std::thread::spawn(move || manager.start("slow", "/tmp"))
    };
    assert!(eventually(Duration::from_secs(2), || factory.acquire_calls() == 1).await);

    // The registry stays usable while the first spawn is still in flight
    let registry = {
        let manager = manager.clone();
        tokio::task::spawn_blocking(move || {
            let other = manager.status("other");
            let fast = manager.start("fast", "/tmp");
            (other.is_running(), fast.started, manager.list())
        })
    };
    let (other_running, fast_started, listed) =
        tokio::time::timeout(Duration::from_secs(1), registry)
            .await
            .expect("registry blocked by a pending spawn")
            .unwrap();
    assert!(!other_running);
    assert!(fast_started);
    assert_eq!(listed, vec!["fast".to_string()]);

    release.send(()).unwrap();
    let slow = starter.join().unwrap();
    assert!(slow.started);
    assert!(slow.running);

    assert_eq!(manager.list(), vec!["fast".to_string(), "slow".to_string()]);
    assert_eq!(factory.acquire_calls(), 2);
}
