//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::cli::{interrupts, open_session, RelayClient, SessionArgs};
use crate::core::chat_stream::ChatStreamService;
use crate::core::config::Config;
use crate::core::session::SessionUpdate;
use crate::utils::logging::LoggingState;

pub async fn run_say(args: SessionArgs, prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: agentdesk say <prompt>");
        std::process::exit(1);
    }

    let config = Config::load()?;
    let client = RelayClient::from_config(&config);
    let mut session = open_session(&config, &args, LoggingState::default()).await;

    let prepared = session.begin_send(&prompt)?;
    let (stream_service, mut rx) = ChatStreamService::new();
    let mut interrupts = interrupts()?;
    stream_service.spawn_stream(client.stream_params(prepared));

    let mut stdout = io::stdout();
    loop {
        tokio::select! {
            message = rx.recv() => {
                let Some((message, stream_id)) = message else {
                    break;
                };
                match session.apply(stream_id, message) {
                    Some(SessionUpdate::Content { delta }) => {
                        write!(stdout, "{delta}")?;
                        stdout.flush()?;
                    }
                    Some(SessionUpdate::Failed(message)) => {
                        eprintln!("\n{message}");
                        std::process::exit(1);
                    }
                    Some(SessionUpdate::Finished) => {
                        println!();
                        break;
                    }
                    Some(SessionUpdate::Started) | None => {}
                }
            }
            Some(()) = interrupts.recv() => {
                session.cancel();
                println!();
                std::process::exit(130);
            }
        }
    }

    Ok(())
}
