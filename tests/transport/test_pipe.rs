//! Tests for the pipe transport against real `/bin/sh` processes

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kodegen_codex_session::{
    EventReceiver, LaunchCommand, OutputStream, ProcessTransportFactory, SessionManager,
    SessionMode, SessionOptions, SessionStatus, Transport, TransportCapabilities, TransportEvent,
    TransportExit, TransportFactory, TransportKind, TurnRequest,
};

const LIMIT: Duration = Duration::from_secs(5);

fn sh(script: &str) -> LaunchCommand {
    LaunchCommand::new("/bin/sh", std::env::temp_dir()).args(["-c", script])
}

/// Collect output per stream until the exit event
async fn drain(events: &mut EventReceiver) -> (String, String, TransportExit) {
    let mut stdout = String::new();
    let mut stderr = String::new();
    let exit = tokio::time::timeout(LIMIT, async {
        loop {
            match events.recv().await {
                Some(TransportEvent::Data {
                    stream: OutputStream::Stdout,
                    text,
                }) => stdout.push_str(&text),
                Some(TransportEvent::Data {
                    stream: OutputStream::Stderr,
                    text,
                }) => stderr.push_str(&text),
                Some(TransportEvent::Exited(exit)) => break exit,
                None => panic!("event channel closed before the exit event"),
            }
        }
    })
    .await
    .expect("process did not exit");
    (stdout, stderr, exit)
}

async fn read_until(events: &mut EventReceiver, needle: &str) -> String {
    let mut seen = String::new();
    tokio::time::timeout(LIMIT, async {
        while !seen.contains(needle) {
            match events.recv().await {
                Some(TransportEvent::Data { text, .. }) => seen.push_str(&text),
                Some(TransportEvent::Exited(exit)) => panic!("exited early: {exit:?}"),
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected output never arrived");
    seen
}

#[tokio::test]
async fn test_persistent_pipe_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let factory = ProcessTransportFactory::pipe_only();
    assert!(factory.pty_disabled());

    let transport = factory
        .acquire(&sh(r#"while read line; do echo "got: $line"; done"#))
        .expect("spawn sh");
    assert_eq!(transport.kind(), TransportKind::Pipe);
    assert!(transport.pid().is_some());
    assert!(!transport.capabilities().contains(TransportCapabilities::TERMINAL));
    assert_eq!(transport.line_terminator(), "\n");

    let mut events = transport.subscribe();
    tokio_test::assert_ok!(transport.write("hello\n"));
    let seen = read_until(&mut events, "got: hello").await;
    assert!(seen.contains("got: hello"));

    transport.kill().unwrap();
    let (_, _, exit) = drain(&mut events).await;
    assert_eq!(exit.exit_code, None);
    assert_eq!(exit.signal.as_deref(), Some("SIGKILL"));
    assert!(transport.has_exited());
    tokio_test::assert_err!(transport.write("late\n"));
}

#[tokio::test]
async fn test_one_shot_separates_streams() {
    let factory = ProcessTransportFactory::pipe_only();
    let transport = factory
        .spawn_one_shot(&sh("printf 'out\\n'; printf 'err\\n' >&2; exit 3"))
        .expect("spawn sh");
    assert_eq!(transport.kind(), TransportKind::OneShot);
    assert!(transport.write("ignored").is_err());

    let mut events = transport.subscribe();
    let (stdout, stderr, exit) = drain(&mut events).await;
    assert_eq!(stdout, "out\n");
    assert_eq!(stderr, "err\n");
    assert_eq!(exit.exit_code, Some(3));
    assert!(!exit.success());
    assert_eq!(transport.exit_watch().borrow().clone(), Some(exit));
}

#[tokio::test]
async fn test_child_environment() {
    let factory = ProcessTransportFactory::pipe_only();
    let command = sh(r#"echo "$CODEX_TEST_FLAG"; echo "$PATH"; echo "${LD_PRELOAD:-unset}""#)
        .env("CODEX_TEST_FLAG", "on")
        .env("LD_PRELOAD", "/tmp/evil.so");
    let transport = factory.spawn_one_shot(&command).expect("spawn sh");

    let mut events = transport.subscribe();
    let (stdout, _, exit) = drain(&mut events).await;
    assert!(exit.success());

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "on");
    assert!(lines[1].split(':').any(|entry| entry == "/usr/local/bin"));
    if std::env::var_os("LD_PRELOAD").is_none() {
        assert_eq!(lines[2], "unset");
    }
}

#[tokio::test]
async fn test_missing_working_directory_fails_startup() {
    let factory = ProcessTransportFactory::pipe_only();
    let command = LaunchCommand::new("/bin/sh", "/definitely/not/a/dir").args(["-c", "true"]);
    let err = factory.spawn_one_shot(&command).err().expect("spawn must fail");
    assert!(err.to_string().contains("Working directory does not exist"));
    let err = factory.acquire(&command).err().expect("spawn must fail");
    assert!(err.to_string().contains("Working directory does not exist"));
}

#[tokio::test]
async fn test_large_output_reaches_a_slow_subscriber() {
    let factory = ProcessTransportFactory::pipe_only();
    let transport = factory
        .spawn_one_shot(&sh("i=0; while [ $i -lt 20000 ]; do echo \"line $i\"; i=$((i+1)); done"))
        .expect("spawn sh");
    let mut events = transport.subscribe();

    // Let the process finish before reading anything
    let mut exit_rx = transport.exit_watch();
    tokio::time::timeout(LIMIT, exit_rx.wait_for(Option::is_some))
        .await
        .expect("process did not exit")
        .expect("exit watch closed");

    let (stdout, _, exit) = drain(&mut events).await;
    assert!(exit.success());
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 20_000);
    assert_eq!(lines[0], "line 0");
    assert_eq!(lines[19_999], "line 19999");
}

#[tokio::test]
async fn test_interactive_session_over_pipes() {
    let options = SessionOptions::builder()
        .program("/bin/sh")
        .interactive_args(vec!["-c", r#"while read line; do echo "codex> $line"; done"#])
        .build();
    let manager = SessionManager::with_factory(options, Arc::new(ProcessTransportFactory::pipe_only()));
    let cwd = std::env::temp_dir();

    let request = TurnRequest::new("ping")
        .with_idle(Duration::from_millis(200))
        .with_timeout(LIMIT);
    let result = manager.continue_turn("sh", &cwd, request).await.unwrap();
    assert_eq!(result.output, "codex> ping");

    match manager.status("sh") {
        SessionStatus::Running(running) => assert_eq!(running.transport_kind, TransportKind::Pipe),
        SessionStatus::Absent(_) => panic!("session should be running"),
    }
    assert!(manager.stop("sh").stopped);
}

fn write_fake_codex(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("fake-codex");
    let script = r#"#!/bin/sh
for last; do :; done
resumed=no
[ "$2" = "resume" ] && resumed=yes
echo '{"type":"thread.started","thread_id":"th_sh"}'
echo 'warming up' >&2
printf '{"type":"item.completed","item":{"type":"agent_message","text":"%s (resumed=%s)"}}\n' "$last" "$resumed"
"#;
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_structured_session_with_fake_cli() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_fake_codex(dir.path());

    let options = SessionOptions::builder()
        .program(&program)
        .mode(SessionMode::Structured)
        .build();
    let manager = SessionManager::with_factory(options, Arc::new(ProcessTransportFactory::pipe_only()));

    let request = || TurnRequest::new("hello there").with_timeout(LIMIT);
    let first = manager.continue_turn("t", dir.path(), request()).await.unwrap();
    assert_eq!(first.output, "hello there (resumed=no)");

    let second = manager.continue_turn("t", dir.path(), request()).await.unwrap();
    assert_eq!(second.output, "hello there (resumed=yes)");

    let status = manager.status("t");
    match status {
        SessionStatus::Running(running) => {
            assert_eq!(running.remote_session_id.map(|id| id.as_str().to_string()), Some("th_sh".into()));
            assert!(running.output_tail.contains("warming up"));
        }
        SessionStatus::Absent(_) => panic!("session should be registered"),
    }
}
