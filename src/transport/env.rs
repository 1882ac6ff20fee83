//! Process environment for spawned CLI processes
//!
//! Children inherit the host environment with three adjustments: standard
//! binary directories are guaranteed on `PATH`, caller overrides of
//! loader-hijacking variables are dropped, and pseudo-terminal children get a
//! terminal type.

use std::collections::HashMap;
use std::env;

/// Directories that must be on `PATH` so the CLI and its helpers resolve
pub const STANDARD_PATH_ENTRIES: &[&str] = &[
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
];

/// Variables a caller may not override for the child
///
/// These affect how the child loads and executes code. `PATH` is handled
/// separately by [`ensure_standard_path`].
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

/// Secret-bearing variables reported (masked) when a process is spawned
pub const SECRET_ENV_VARS: &[&str] = &["OPENAI_API_KEY", "CODEX_API_KEY"];

/// Terminal type advertised to pseudo-terminal children
pub const TERMINAL_TYPE: &str = "xterm-256color";

/// Prepend the standard directories to a `PATH` value, keeping every
/// existing entry that is not already present
#[must_use]
pub fn ensure_standard_path(current: Option<&str>) -> String {
    let mut entries: Vec<&str> = STANDARD_PATH_ENTRIES.to_vec();
    if let Some(current) = current {
        for entry in current.split(':') {
            if !entry.is_empty() && !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }
    entries.join(":")
}

/// Build the full environment for a child process
#[must_use]
pub fn build_process_env(
    overrides: &HashMap<String, String>,
    terminal: bool,
) -> HashMap<String, String> {
    build_env_from(env::vars(), overrides, terminal)
}

pub(crate) fn build_env_from(
    host: impl IntoIterator<Item = (String, String)>,
    overrides: &HashMap<String, String>,
    terminal: bool,
) -> HashMap<String, String> {
    let mut process_env: HashMap<String, String> = host.into_iter().collect();

    for (key, value) in overrides {
        if DANGEROUS_ENV_VARS.contains(&key.as_str()) {
            log::warn!("Ignoring override of {key} for Codex process");
            continue;
        }
        process_env.insert(key.clone(), value.clone());
    }

    let path = ensure_standard_path(process_env.get("PATH").map(String::as_str));
    process_env.insert("PATH".to_string(), path);

    if terminal {
        process_env
            .entry("TERM".to_string())
            .or_insert_with(|| TERMINAL_TYPE.to_string());
    }

    process_env
}

/// Mask a secret for logging: first 6 and last 4 characters survive
#[must_use]
pub fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Describe a secret variable's value for logging
#[must_use]
pub fn format_env_value(value: Option<&str>) -> String {
    match value.map(str::trim) {
        None | Some("") => "missing".to_string(),
        Some(v) => mask_token(v),
    }
}

/// Log the masked state of secret-bearing variables in `process_env`
pub fn log_secret_env(process_env: &HashMap<String, String>) {
    for key in SECRET_ENV_VARS {
        log::debug!(
            "Codex env {key}={}",
            format_env_value(process_env.get(*key).map(String::as_str))
        );
    }
}
