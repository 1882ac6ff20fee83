//! Pseudo-terminal transport
//!
//! The CLI runs attached to the slave side of a pty, so it sees a real
//! terminal. Output is read from the master on a blocking task; input goes
//! through a writer task fed by an unbounded channel.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use portable_pty::{ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::{mpsc, watch};

use crate::error::{Result, SessionError};
use crate::types::options::PtyDimensions;

use super::env::{build_process_env, log_secret_env};
use super::{
    ChunkDecoder, EventHub, EventReceiver, LaunchCommand, OutputStream, Transport,
    TransportCapabilities, TransportExit, TransportKind,
};

/// How long the exit task waits for buffered output after the child exits
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Persistent process attached to a pseudo-terminal
pub struct PtyTransport {
    pid: Option<u32>,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    killer: parking_lot::Mutex<Box<dyn ChildKiller + Send + Sync>>,
    hub: EventHub,
    // Dropping the master closes the terminal, so it lives as long as the handle.
    _master: parking_lot::Mutex<Box<dyn MasterPty + Send>>,
}

impl PtyTransport {
    /// Spawn `program` with the command's arguments on a fresh pty
    ///
    /// # Errors
    /// Returns `StartupFailure` if the working directory is missing, the pty
    /// cannot be opened or the child cannot be spawned
    pub fn spawn(command: &LaunchCommand, program: &Path, size: PtyDimensions) -> Result<Self> {
        // portable-pty falls back to $HOME for a missing cwd instead of failing.
        command.check_cwd()?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::startup(format!("Failed to open pty: {e}")))?;

        let mut builder = CommandBuilder::new(program);
        builder.args(&command.args);
        builder.cwd(&command.cwd);
        builder.env_clear();
        let process_env = build_process_env(&command.env, true);
        log_secret_env(&process_env);
        for (key, value) in &process_env {
            builder.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| SessionError::startup(format!("Failed to spawn Codex on pty: {e}")))?;
        // The child holds its own copy of the slave.
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();

        let hub = EventHub::new();

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::startup(format!("Failed to read pty: {e}")))?;
        let reader_handle = tokio::task::spawn_blocking({
            let hub = hub.clone();
            move || read_loop(reader, &hub)
        });

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::startup(format!("Failed to write pty: {e}")))?;
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::task::spawn_blocking(move || write_loop(writer, writer_rx));

        let exit_hub = hub.clone();
        tokio::spawn(async move {
            let status = tokio::task::spawn_blocking(move || child.wait()).await;
            let exit = match status {
                Ok(Ok(status)) => TransportExit {
                    exit_code: i32::try_from(status.exit_code()).ok(),
                    signal: None,
                },
                Ok(Err(e)) => {
                    log::warn!("Failed to wait for pty child: {e}");
                    TransportExit::default()
                }
                Err(e) => {
                    log::warn!("pty wait task failed: {e}");
                    TransportExit::default()
                }
            };
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader_handle)
                .await
                .is_err()
            {
                log::debug!("pty reader still open after child exit");
            }
            exit_hub.publish_exit(exit);
        });

        Ok(Self {
            pid,
            writer_tx,
            killer: parking_lot::Mutex::new(killer),
            hub,
            _master: parking_lot::Mutex::new(pair.master),
        })
    }
}

fn read_loop(mut reader: Box<dyn Read + Send>, hub: &EventHub) {
    let mut decoder = ChunkDecoder::default();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() {
                    hub.publish(OutputStream::Stdout, text);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            // EIO once every slave handle is closed
            Err(_) => break,
        }
    }
    let rest = decoder.finish();
    if !rest.is_empty() {
        hub.publish(OutputStream::Stdout, rest);
    }
}

fn write_loop(mut writer: Box<dyn Write + Send>, mut writer_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = writer_rx.blocking_recv() {
        if writer.write_all(&bytes).and_then(|()| writer.flush()).is_err() {
            break;
        }
    }
}

impl Transport for PtyTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pty
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities::all()
    }

    fn write(&self, text: &str) -> Result<()> {
        if self.has_exited() {
            return Err(SessionError::transport("pty process has exited"));
        }
        self.writer_tx
            .send(text.as_bytes().to_vec())
            .map_err(|_| SessionError::transport("pty writer closed"))
    }

    fn kill(&self) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }
        self.killer
            .lock()
            .kill()
            .map_err(|e| SessionError::transport(format!("Failed to kill pty child: {e}")))
    }

    fn subscribe(&self) -> EventReceiver {
        self.hub.subscribe()
    }

    fn exit_watch(&self) -> watch::Receiver<Option<TransportExit>> {
        self.hub.exit_watch()
    }
}

impl Drop for PtyTransport {
    fn drop(&mut self) {
        if !self.has_exited() {
            let _ = self.killer.lock().kill();
        }
    }
}
