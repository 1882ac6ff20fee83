// Interactive front end for one Codex session
//
// Reads prompts from stdin, one per line, and streams each turn's output to
// stdout. Lines starting with `/` are commands: /start, /status, /stop, /list.
//
// Usage: kodegen-codex-session [THREAD_ID] [CWD]

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::StreamExt;
use kodegen_codex_session::manager::NO_OUTPUT_MESSAGE;
use kodegen_codex_session::{SessionManager, SessionOptions, TurnRequest, TurnStreamEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const DEFAULT_THREAD_ID: &str = "cli";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let thread_id = args.next().unwrap_or_else(|| DEFAULT_THREAD_ID.to_string());
    let cwd = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("failed to read current directory")?,
    };

    let options = SessionOptions::from_env();
    log::info!(
        "kodegen-codex-session {} (thread={thread_id}, mode={:?}, cwd={})",
        kodegen_codex_session::VERSION,
        options.mode,
        cwd.display()
    );
    let manager = SessionManager::new(options);

    let result = run(&manager, &thread_id, &cwd).await;
    manager.shutdown();
    result
}

async fn run(manager: &SessionManager, thread_id: &str, cwd: &Path) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/start" => print_json(&manager.start(thread_id, cwd))?,
            "/status" => print_json(&manager.status(thread_id))?,
            "/stop" => print_json(&manager.stop(thread_id))?,
            "/list" => print_json(&manager.list())?,
            "/quit" | "/exit" => break,
            prompt => {
                let cancel = CancellationToken::new();
                let request = TurnRequest::new(prompt).with_cancel(cancel.clone());
                let stream = manager.stream_turn(thread_id, cwd, request);
                tokio::pin!(stream);

                loop {
                    let event = tokio::select! {
                        event = stream.next() => event,
                        _ = tokio::signal::ctrl_c() => {
                            cancel.cancel();
                            continue;
                        }
                    };
                    match event {
                        Some(TurnStreamEvent::Chunk { text }) => {
                            write!(stdout, "{text}")?;
                            stdout.flush()?;
                        }
                        Some(TurnStreamEvent::Completed { output }) => {
                            // Chunks already carried the text; only the empty notice is new.
                            if output == NO_OUTPUT_MESSAGE {
                                writeln!(stdout, "{output}")?;
                            } else {
                                writeln!(stdout)?;
                            }
                        }
                        Some(TurnStreamEvent::Failed { kind, message }) => {
                            eprintln!("\n[{kind}] {message}");
                        }
                        None => break,
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
