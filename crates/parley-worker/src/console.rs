//! Line-oriented console that stands in for the speech pipeline.
//!
//! Plain lines are final transcripts. Lines starting with `/` are commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/tool <name> [json]` | invoke a tool as the decision source would |
//! | `/tools` | print the published tool schemas |
//! | `/reset` | restart the session |
//! | `/quit` | drain and exit |

use std::sync::Arc;

use parley_core::{
    Conversational, DialogueError, Dispatcher, Domain, Phase, SessionId, SessionWorker,
    Transcript, TurnProcessor,
};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Tool { name: String, params: Value },
    Tools,
    Reset,
    Quit,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command: /{0}")]
    Unknown(String),

    #[error("usage: /tool <name> [json parameters]")]
    MissingToolName,

    #[error("tool parameters are not valid JSON: {0}")]
    BadParams(#[from] serde_json::Error),
}

/// Parses one console line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (word, rest) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(w, r)| (w, r.trim()));
    let parsed = match word {
        "tool" => {
            let (name, json) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, ""), |(n, j)| (n, j.trim()));
            if name.is_empty() {
                return Err(CommandError::MissingToolName);
            }
            let params = if json.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(json)?
            };
            Command::Tool {
                name: name.to_string(),
                params,
            }
        }
        "tools" => Command::Tools,
        "reset" => Command::Reset,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(parsed))
}

async fn run_tool<D: Domain>(dispatcher: &Dispatcher<D>, id: SessionId, name: &str, params: &Value) {
    match dispatcher.invoke(id, name, params).await {
        Ok(result) => println!("[{}] {}", result.phase, result.text),
        Err(err) if err.is_caller_fault() => println!("! {err}"),
        Err(err) => {
            tracing::info!(tool = name, error = %err, "tool call rejected");
            println!("{}", err.spoken());
        }
    }
}

async fn reset<D: Domain>(dispatcher: &Dispatcher<D>, id: SessionId) -> Result<(), DialogueError> {
    dispatcher.reset(id).await?;
    let session = dispatcher.store().get(id).await?;
    println!("[{}] session restarted", session.phase().as_str());
    Ok(())
}

fn print_tools<D: Domain>(dispatcher: &Dispatcher<D>) {
    match serde_json::to_string_pretty(&dispatcher.registry().schema()) {
        Ok(schema) => println!("{schema}"),
        Err(err) => tracing::error!(error = %err, "failed to render tool schema"),
    }
}

/// Hosts one tool-driven session: every line must be a command.
pub async fn drive<D: Domain>(dispatcher: Dispatcher<D>) -> Result<(), DialogueError> {
    let id = dispatcher.store().create();
    println!(
        "{} session {} opened; tools: {}",
        D::NAME,
        id.short(),
        dispatcher.registry().names().join(", ")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(Command::Say(_))) => {
                println!("The {} agent is driven by tool calls: /tool <name> {{json}}", D::NAME);
            }
            Ok(Some(Command::Tool { name, params })) => run_tool(&dispatcher, id, &name, &params).await,
            Ok(Some(Command::Tools)) => print_tools(&dispatcher),
            Ok(Some(Command::Reset)) => reset(&dispatcher, id).await?,
            Ok(Some(Command::Quit)) => break,
            Err(err) => println!("! {err}"),
        }
    }

    dispatcher.store().close(id);
    Ok(())
}

/// Hosts one transcript-driven session behind a [`SessionWorker`].
pub async fn converse<D: Conversational>(dispatcher: Dispatcher<D>) -> Result<(), DialogueError> {
    let processor = Arc::new(TurnProcessor::new(dispatcher));
    let (id, greeting) = processor.open_session();
    println!("{greeting}");

    let (reply_tx, mut reply_rx) = mpsc::channel(16);
    let worker = SessionWorker::spawn(processor.clone(), id, reply_tx);
    let printer = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            println!("{}", reply.text);
        }
    });

    let dispatcher = processor.dispatcher();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(Command::Say(text))) => {
                if let Err(err) = worker.submit(Transcript::final_text(text)).await {
                    tracing::warn!(error = %err, "session worker is gone");
                    break;
                }
            }
            Ok(Some(Command::Tool { name, params })) => run_tool(dispatcher, id, &name, &params).await,
            Ok(Some(Command::Tools)) => print_tools(dispatcher),
            Ok(Some(Command::Reset)) => reset(dispatcher, id).await?,
            Ok(Some(Command::Quit)) => break,
            Err(err) => println!("! {err}"),
        }
    }

    worker.shutdown().await;
    if let Err(err) = printer.await {
        tracing::error!(error = %err, "reply printer failed");
    }
    dispatcher.store().close(id);
    Ok(())
}
