//! Line-oriented console chat.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::cli::{interrupts, open_session, ChatArgs, RelayClient};
use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::core::config::Config;
use crate::core::prompt::{AgentMode, ALL_MODES};
use crate::core::session::{ChatSession, SessionUpdate};
use crate::core::steps::AgentStep;
use crate::utils::logging::LoggingState;

const HELP_TEXT: &str = "Commands:
  /mode <mode>      Switch between documents, datascience, and research
  /upload <file>    Add a document to the context
  /docs             List uploaded documents
  /remove <id>      Remove an uploaded document
  /log [file]       Start logging to a file, or pause/resume logging
  /help             Show this help
  /quit             Leave the chat
Ctrl+C cancels a reply while it is streaming and leaves at the prompt.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Mode(Option<String>),
    Upload(PathBuf),
    Docs,
    Remove(String),
    Log(Option<PathBuf>),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Empty,
    Message(String),
    Command(ChatCommand),
}

pub enum CommandResult {
    Continue(String),
    Quit,
}

pub fn parse_input(line: &str) -> Result<ChatInput, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ChatInput::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ChatInput::Message(line.to_string()));
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };
    let argument = (!argument.is_empty()).then(|| argument.to_string());

    let command = match name.to_ascii_lowercase().as_str() {
        "mode" => ChatCommand::Mode(argument),
        "upload" => ChatCommand::Upload(
            argument
                .map(PathBuf::from)
                .ok_or_else(|| "Usage: /upload <file>".to_string())?,
        ),
        "docs" => ChatCommand::Docs,
        "remove" => {
            ChatCommand::Remove(argument.ok_or_else(|| "Usage: /remove <id>".to_string())?)
        }
        "log" => ChatCommand::Log(argument.map(PathBuf::from)),
        "help" => ChatCommand::Help,
        "quit" | "exit" => ChatCommand::Quit,
        _ => return Err(format!("Unknown command: /{name}. Type /help for commands.")),
    };
    Ok(ChatInput::Command(command))
}

pub async fn execute_command(session: &mut ChatSession, command: ChatCommand) -> CommandResult {
    let message = match command {
        ChatCommand::Quit => return CommandResult::Quit,
        ChatCommand::Help => format!("{HELP_TEXT}\nLogging: {}", session.logging.status_string()),
        ChatCommand::Mode(None) => {
            let choices: Vec<_> = ALL_MODES.iter().map(|mode| mode.as_str()).collect();
            format!(
                "Mode: {} ({}). Available: {}",
                session.mode().display_name(),
                session.mode(),
                choices.join(", ")
            )
        }
        ChatCommand::Mode(Some(name)) => match name.parse::<AgentMode>() {
            Ok(mode) => {
                session.set_mode(mode);
                format!("Switched to {} mode", mode.display_name())
            }
            Err(err) => err,
        },
        ChatCommand::Upload(path) => {
            let document = session.documents_mut().upload_path(&path).await;
            if document.chunks == 0 {
                format!("📄 Added {} (no text extracted)", document.name)
            } else {
                format!(
                    "📄 Added {} ({} chunks, {})",
                    document.name, document.chunks, document.mime_type
                )
            }
        }
        ChatCommand::Docs => describe_documents(session),
        ChatCommand::Remove(id) => match id.parse::<u64>() {
            Ok(id) => match session.documents_mut().remove(id) {
                Some(document) => format!("Removed {}", document.name),
                None => format!("No document with id {id}"),
            },
            Err(_) => format!("Invalid document id: {id}"),
        },
        ChatCommand::Log(Some(path)) => match session.logging.set_log_file(path) {
            Ok(message) => message,
            Err(err) => format!("Could not open log file: {err}"),
        },
        ChatCommand::Log(None) => match session.logging.toggle_logging() {
            Ok(message) | Err(message) => message,
        },
    };
    CommandResult::Continue(message)
}

fn describe_documents(session: &ChatSession) -> String {
    let documents = session.documents().documents();
    if documents.is_empty() {
        return "No documents uploaded.".to_string();
    }

    let mut out = String::from("Documents:");
    for document in documents {
        out.push_str(&format!(
            "\n  [{}] {} ({}, {} bytes, {} chunks)",
            document.id, document.name, document.mime_type, document.size, document.chunks
        ));
    }
    out
}

fn step_line(steps: &[AgentStep]) -> String {
    steps
        .iter()
        .map(AgentStep::summary)
        .collect::<Vec<_>>()
        .join("  ")
}

pub async fn run_chat(args: ChatArgs) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let client = RelayClient::from_config(&config);
    let logging = LoggingState::new(args.log.clone())?;
    let mut session = open_session(&config, &args.session, logging).await;
    let (stream_service, mut rx) = ChatStreamService::new();
    let mut interrupts = interrupts()?;

    eprintln!("💬 agentdesk chat ({} mode)", session.mode().display_name());
    eprintln!("📡 Relay: {}", client.relay_url());
    eprintln!("💡 Type /help for commands, /quit to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(()) = interrupts.recv() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            Ok(ChatInput::Empty) => {}
            Ok(ChatInput::Command(command)) => match execute_command(&mut session, command).await
            {
                CommandResult::Continue(message) => println!("{message}"),
                CommandResult::Quit => break,
            },
            Ok(ChatInput::Message(text)) => match session.begin_send(&text) {
                Ok(prepared) => {
                    println!("{}", step_line(session.current_steps()));
                    stream_service.spawn_stream(client.stream_params(prepared));
                    stream_reply(&mut session, &mut rx, &mut interrupts).await?;
                }
                Err(err) => eprintln!("⚠️  {err}"),
            },
            Err(message) => eprintln!("⚠️  {message}"),
        }
    }

    Ok(())
}

async fn stream_reply(
    session: &mut ChatSession,
    rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> io::Result<()> {
    let mut stdout = io::stdout();
    while session.is_processing() {
        tokio::select! {
            message = rx.recv() => {
                let Some((message, stream_id)) = message else {
                    session.cancel();
                    break;
                };
                match session.apply(stream_id, message) {
                    Some(SessionUpdate::Started) => {
                        println!("{}", step_line(session.current_steps()));
                    }
                    Some(SessionUpdate::Content { delta }) => {
                        write!(stdout, "{delta}")?;
                        stdout.flush()?;
                    }
                    Some(SessionUpdate::Finished) => println!(),
                    Some(SessionUpdate::Failed(message)) => {
                        println!();
                        eprintln!("{message}");
                    }
                    None => {}
                }
            }
            Some(()) = interrupts.recv() => {
                session.cancel();
                println!("\n⏹  Cancelled");
            }
        }
    }
    Ok(())
}
