//! Transport acquisition with pseudo-terminal preference

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::types::options::PtyDimensions;

use super::command::find_cli;
use super::{LaunchCommand, PipeTransport, PtyTransport, TransportHandle};

/// Source of transports for the session manager
///
/// Implemented by [`ProcessTransportFactory`] for real processes; tests
/// provide stub implementations.
pub trait TransportFactory: Send + Sync {
    /// Acquire a persistent transport for an interactive session
    ///
    /// # Errors
    /// Returns `StartupFailure` if no transport can be acquired
    fn acquire(&self, command: &LaunchCommand) -> Result<TransportHandle>;

    /// Spawn a process for a single structured invocation
    ///
    /// # Errors
    /// Returns `StartupFailure` if the process cannot be spawned
    fn spawn_one_shot(&self, command: &LaunchCommand) -> Result<TransportHandle>;
}

/// Spawns a persistent process on a pseudo-terminal
pub type PtySpawner = fn(&LaunchCommand, &Path, PtyDimensions) -> Result<TransportHandle>;

fn spawn_native_pty(
    command: &LaunchCommand,
    program: &Path,
    size: PtyDimensions,
) -> Result<TransportHandle> {
    Ok(Arc::new(PtyTransport::spawn(command, program, size)?))
}

/// Factory spawning real processes
///
/// Persistent sessions try a pseudo-terminal first. After the first pty
/// failure the factory uses pipes for the rest of its lifetime and logs the
/// fallback once. A missing working directory fails before either is tried
/// and leaves the pty preference alone.
#[derive(Debug)]
pub struct ProcessTransportFactory {
    pty_size: PtyDimensions,
    pty_disabled: AtomicBool,
    spawn_pty: PtySpawner,
}

impl ProcessTransportFactory {
    /// Create a factory that prefers pseudo-terminals
    #[must_use]
    pub const fn new(pty_size: PtyDimensions) -> Self {
        Self {
            pty_size,
            pty_disabled: AtomicBool::new(false),
            spawn_pty: spawn_native_pty,
        }
    }

    /// Create a factory that only uses pipes
    #[must_use]
    pub const fn pipe_only() -> Self {
        Self {
            pty_size: PtyDimensions { rows: 40, cols: 120 },
            pty_disabled: AtomicBool::new(true),
            spawn_pty: spawn_native_pty,
        }
    }

    /// Replace the pseudo-terminal spawner (for hosts with their own pty layer)
    #[must_use]
    pub const fn with_pty_spawner(mut self, spawner: PtySpawner) -> Self {
        self.spawn_pty = spawner;
        self
    }

    /// Whether pty acquisition is skipped
    #[must_use]
    pub fn pty_disabled(&self) -> bool {
        self.pty_disabled.load(Ordering::SeqCst)
    }
}

impl Default for ProcessTransportFactory {
    fn default() -> Self {
        Self::new(PtyDimensions::default())
    }
}

impl TransportFactory for ProcessTransportFactory {
    fn acquire(&self, command: &LaunchCommand) -> Result<TransportHandle> {
        command.check_cwd()?;
        let program = find_cli(&command.program)?;

        if !self.pty_disabled() {
            match (self.spawn_pty)(command, &program, self.pty_size) {
                Ok(transport) => return Ok(transport),
                Err(e) => {
                    if !self.pty_disabled.swap(true, Ordering::SeqCst) {
                        log::warn!("pty unavailable, falling back to pipes: {e}");
                    }
                }
            }
        }

        Ok(Arc::new(PipeTransport::spawn(command, &program)?))
    }

    fn spawn_one_shot(&self, command: &LaunchCommand) -> Result<TransportHandle> {
        command.check_cwd()?;
        let program = find_cli(&command.program)?;
        Ok(Arc::new(PipeTransport::spawn_one_shot(command, &program)?))
    }
}
