//! Launch command building for the Codex CLI

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, SessionError};
use crate::types::options::SessionOptions;

/// Binary name searched on `PATH` when no program is configured
pub const DEFAULT_PROGRAM: &str = "codex";

/// Everything needed to spawn one CLI process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Program name or path (resolved by the factory)
    pub program: PathBuf,
    /// Argument vector, excluding the program
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Environment overrides applied on top of the host environment
    pub env: HashMap<String, String>,
}

impl LaunchCommand {
    /// Create a command with no arguments
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
        }
    }

    /// Append an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment override
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command for the long-lived interactive process
    #[must_use]
    pub fn interactive(options: &SessionOptions, cwd: &Path) -> Self {
        let mut command =
            Self::new(program_of(options), cwd).args(options.interactive_args.iter().cloned());
        command.env.clone_from(&options.env);
        command
    }

    /// Command for one structured invocation
    ///
    /// Produces `exec <base args> <prompt>`, or
    /// `exec resume <base args> <remote id> <prompt>` when a resumable id is known.
    #[must_use]
    pub fn one_shot(
        options: &SessionOptions,
        cwd: &Path,
        remote_session_id: Option<&str>,
        prompt: &str,
    ) -> Self {
        let mut command = Self::new(program_of(options), cwd).arg("exec");
        if remote_session_id.is_some() {
            command = command.arg("resume");
        }
        command = command.args(options.one_shot_args.iter().cloned());
        if let Some(id) = remote_session_id {
            command = command.arg(id);
        }
        command = command.arg(prompt);
        command.env.clone_from(&options.env);
        command
    }

    /// Fail unless the working directory is an existing directory
    ///
    /// # Errors
    /// Returns `StartupFailure` naming the missing directory
    pub fn check_cwd(&self) -> Result<()> {
        if self.cwd.is_dir() {
            return Ok(());
        }
        Err(SessionError::startup(format!(
            "Working directory does not exist: {}",
            self.cwd.display()
        )))
    }

    /// Command line rendered for logs (prompt arguments are not quoted)
    #[must_use]
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

fn program_of(options: &SessionOptions) -> PathBuf {
    options
        .program
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM))
}

/// Resolve the CLI binary
///
/// Paths with a directory component are used as given. Bare names are
/// searched on `PATH`, then in common install locations.
///
/// # Errors
/// Returns `StartupFailure` if the binary cannot be found
pub fn find_cli(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 {
        return Ok(program.to_path_buf());
    }

    if let Ok(path) = which::which(program) {
        return Ok(path);
    }

    let name = program.as_os_str();
    let home = env::var("HOME").unwrap_or_else(|_| String::from("/root"));
    let locations = vec![
        PathBuf::from(&home).join(".npm-global/bin"),
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/opt/homebrew/bin"),
        PathBuf::from(&home).join(".local/bin"),
        PathBuf::from(&home).join(".cargo/bin"),
        PathBuf::from(home).join("node_modules/.bin"),
    ];

    for dir in locations {
        let path = dir.join(name);
        if path.is_file() {
            return Ok(path);
        }
    }

    Err(SessionError::startup(format!(
        "Codex CLI '{}' not found on PATH or in common install locations",
        program.display()
    )))
}
