//! Pipe transport using `tokio::process`
//!
//! Used as the fallback for persistent sessions when no pseudo-terminal is
//! available, and for every one-shot invocation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};

use super::env::{build_process_env, log_secret_env};
use super::{
    ChunkDecoder, EventHub, EventReceiver, LaunchCommand, OutputStream, Transport,
    TransportCapabilities, TransportExit, TransportKind,
};

/// How long the exit task waits for the readers to hit EOF
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Process driven through stdin/stdout/stderr pipes
pub struct PipeTransport {
    kind: TransportKind,
    pid: Option<u32>,
    writer_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    kill_token: CancellationToken,
    hub: EventHub,
}

impl PipeTransport {
    /// Spawn a persistent pipe-backed process that accepts input
    ///
    /// # Errors
    /// Returns `StartupFailure` if the process cannot be spawned
    pub fn spawn(command: &LaunchCommand, program: &Path) -> Result<Self> {
        Self::spawn_kind(command, program, TransportKind::Pipe)
    }

    /// Spawn a one-shot process with stdin closed
    ///
    /// # Errors
    /// Returns `StartupFailure` if the process cannot be spawned
    pub fn spawn_one_shot(command: &LaunchCommand, program: &Path) -> Result<Self> {
        Self::spawn_kind(command, program, TransportKind::OneShot)
    }

    fn spawn_kind(command: &LaunchCommand, program: &Path, kind: TransportKind) -> Result<Self> {
        let interactive = kind != TransportKind::OneShot;
        command.check_cwd()?;

        let process_env = build_process_env(&command.env, false);
        log_secret_env(&process_env);

        let mut cmd = Command::new(program);
        cmd.args(&command.args)
            .current_dir(&command.cwd)
            .env_clear()
            .envs(process_env)
            .stdin(if interactive {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SessionError::startup(format!("Failed to start Codex: {e}")))?;

        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::startup("Failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::startup("Failed to get stderr handle"))?;

        let hub = EventHub::new();
        let stdout_task = spawn_reader(stdout, OutputStream::Stdout, hub.clone());
        let stderr_task = spawn_reader(stderr, OutputStream::Stderr, hub.clone());

        let writer_tx = if interactive {
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| SessionError::startup("Failed to get stdin handle"))?;
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(write_loop(stdin, rx));
            Some(tx)
        } else {
            None
        };

        let kill_token = CancellationToken::new();
        let token = kill_token.clone();
        let exit_hub = hub.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                () = token.cancelled() => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let exit = match status {
                Ok(status) => exit_from_status(status),
                Err(e) => {
                    log::warn!("Failed to wait for Codex process: {e}");
                    TransportExit::default()
                }
            };
            let drain = async {
                let _ = stdout_task.await;
                let _ = stderr_task.await;
            };
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, drain).await.is_err() {
                log::debug!("pipe readers still open after process exit");
            }
            exit_hub.publish_exit(exit);
        });

        Ok(Self {
            kind,
            pid,
            writer_tx,
            kill_token,
            hub,
        })
    }
}

fn spawn_reader<R>(
    mut reader: R,
    stream: OutputStream,
    hub: EventHub,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut decoder = ChunkDecoder::default();
        let mut buf = vec![0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = decoder.decode(&buf[..n]);
                    if !text.is_empty() {
                        hub.publish(stream, text);
                    }
                }
            }
        }
        let rest = decoder.finish();
        if !rest.is_empty() {
            hub.publish(stream, rest);
        }
    })
}

async fn write_loop(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = rx.recv().await {
        if stdin.write_all(&bytes).await.is_err() || stdin.flush().await.is_err() {
            break;
        }
    }
    let _ = stdin.shutdown().await;
}

#[cfg(unix)]
fn exit_from_status(status: std::process::ExitStatus) -> TransportExit {
    use std::os::unix::process::ExitStatusExt;
    TransportExit {
        exit_code: status.code(),
        signal: status.signal().map(super::signal_name),
    }
}

#[cfg(not(unix))]
fn exit_from_status(status: std::process::ExitStatus) -> TransportExit {
    TransportExit {
        exit_code: status.code(),
        signal: None,
    }
}

impl Transport for PipeTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn capabilities(&self) -> TransportCapabilities {
        match self.kind {
            TransportKind::OneShot => TransportCapabilities::KILL,
            _ => {
                TransportCapabilities::WRITE
                    | TransportCapabilities::KILL
                    | TransportCapabilities::PERSISTENT
            }
        }
    }

    fn write(&self, text: &str) -> Result<()> {
        let Some(ref tx) = self.writer_tx else {
            return Err(SessionError::transport("one-shot process does not accept input"));
        };
        if self.has_exited() {
            return Err(SessionError::transport("Codex process has exited"));
        }
        tx.send(text.as_bytes().to_vec())
            .map_err(|_| SessionError::transport("stdin writer closed"))
    }

    fn kill(&self) -> Result<()> {
        self.kill_token.cancel();
        Ok(())
    }

    fn subscribe(&self) -> EventReceiver {
        self.hub.subscribe()
    }

    fn exit_watch(&self) -> watch::Receiver<Option<TransportExit>> {
        self.hub.exit_watch()
    }
}

impl Drop for PipeTransport {
    fn drop(&mut self) {
        self.kill_token.cancel();
    }
}
