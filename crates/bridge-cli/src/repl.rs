//! Line-based interactive loop

use std::io::BufRead;

use anyhow::Result;
use bridge_core::session::{ProviderSession, SwitchOutcome};
use bridge_core::BridgeError;
use bridge_runtime::WorkerHandle;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const PROMPT: &str = "\nQuery: ";
const USE_USAGE: &str = "Usage: use <provider>[:<model>]";
const LINE_BUFFER: usize = 16;

/// Input lines for [`run`]
pub type Lines = mpsc::Receiver<std::io::Result<String>>;

/// Read stdin on a detached thread.
///
/// A blocking read left pending there does not hold up runtime shutdown,
/// so Ctrl-C exits without waiting for Enter.
pub fn stdin_lines() -> Lines {
    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// One parsed input line
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Empty,
    Quit,
    Tools,
    Reset,
    Use { provider: &'a str, model: Option<&'a str> },
    Invalid(&'static str),
    Query(&'a str),
}

impl<'a> ReplCommand<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }

        let (head, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(h, r)| (h, r.trim()));

        match head.to_ascii_lowercase().as_str() {
            "quit" if rest.is_empty() => Self::Quit,
            "tools" if rest.is_empty() => Self::Tools,
            "reset" if rest.is_empty() => Self::Reset,
            "use" => parse_use(rest),
            _ => Self::Query(line),
        }
    }
}

fn parse_use(target: &str) -> ReplCommand<'_> {
    let (provider, model) = match target.split_once(':') {
        Some((provider, model)) => (provider.trim(), Some(model.trim()).filter(|m| !m.is_empty())),
        None => (target, None),
    };

    if provider.is_empty() {
        ReplCommand::Invalid(USE_USAGE)
    } else {
        ReplCommand::Use { provider, model }
    }
}

/// `alias (wire-id)`, or just the id when no alias was used
fn model_label(session: &ProviderSession) -> String {
    if session.model_name() == session.model_id() {
        session.model_id().to_string()
    } else {
        format!("{} ({})", session.model_name(), session.model_id())
    }
}

fn error_line(e: &BridgeError) -> String {
    tracing::error!(error = %e, retryable = e.is_retryable(), "Command failed");
    format!("Error: {}", e.user_message())
}

/// Read commands from `input` until `quit` or EOF, writing replies to `output`
pub async fn run<W>(worker: &WorkerHandle, mut input: Lines, mut output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let session = worker.active_session().await?;
    let banner = format!(
        "\nMCP Client Started!\nUsing provider: {}, model: {}\nType your queries, 'use provider:model' to switch, 'tools' to list tools, or 'quit' to exit.\n",
        session.kind(),
        model_label(&session),
    );
    output.write_all(banner.as_bytes()).await?;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = input.recv().await else {
            break;
        };
        let line = line?;

        let reply = match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Invalid(usage) => usage.to_string(),
            ReplCommand::Tools => worker.list_tools().await?.describe(),
            ReplCommand::Reset => {
                worker.reset().await?;
                "Conversation history cleared".to_string()
            }
            ReplCommand::Use { provider, model } => match worker.switch(provider, model).await {
                Ok(SwitchOutcome::Switched(session)) => {
                    format!("Switched to {} using model {}", session.kind(), model_label(&session))
                }
                Ok(SwitchOutcome::Unchanged(session)) => {
                    format!("Already using {} with model {}", session.kind(), model_label(&session))
                }
                Err(e) => error_line(&e),
            },
            ReplCommand::Query(query) => match worker.query(query).await {
                Ok(outcome) => format!("\n{}", outcome.response()),
                Err(e) => format!("\n{}", error_line(&e)),
            },
        };

        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    output.flush().await?;
    Ok(())
}
