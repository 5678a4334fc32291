//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod say;

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::chat_stream::StreamParams;
use crate::core::config::data::RELAY_TOKEN_ENV;
use crate::core::config::{Config, ConfigKey};
use crate::core::prompt::AgentMode;
use crate::core::session::{ChatSession, PreparedSend};
use crate::relay::{self, GatewayClient, RelayState, GATEWAY_API_KEY_ENV};
use crate::utils::logging::LoggingState;

/// Environment variable holding the diagnostics filter.
pub const LOG_FILTER_ENV: &str = "AGENTDESK_LOG";

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_DESCRIBE"),
    " (",
    env!("VERGEN_GIT_SHA"),
    ")\nbuilt: ",
    env!("VERGEN_BUILD_DATE"),
    "\nrustc: ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "agentdesk")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Streaming document, data-science, and research chat over an AI gateway")]
#[command(
    long_about = "agentdesk is a console chat client and the relay it talks to. The relay \
holds the gateway credential, adds the system prompt for the selected mode, and streams the \
gateway's reply back to the client as it is generated.\n\n\
Environment Variables:\n\
  AGENTDESK_RELAY_URL         Relay base URL for chat and say (overrides relay_url)\n\
  AGENTDESK_RELAY_TOKEN       Bearer token sent to the relay\n\
  AGENTDESK_GATEWAY_API_KEY   Bearer token the relay sends to the AI gateway\n\
  AGENTDESK_LOG               Diagnostics filter, e.g. info or agentdesk=debug\n\n\
Chat commands:\n\
  /mode <mode>      Switch between documents, datascience, and research\n\
  /upload <file>    Add a document to the context\n\
  /docs             List uploaded documents\n\
  /remove <id>      Remove an uploaded document\n\
  /log [file]       Start logging to a file, or pause/resume logging\n\
  /help             Show chat commands\n\
  /quit             Leave the chat\n\
  Ctrl+C            Cancel the reply that is streaming, or leave at the prompt"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay endpoint
    Serve {
        /// Address to bind (defaults to the configured listen address)
        #[arg(long, value_name = "ADDR")]
        listen: Option<SocketAddr>,
        /// Emit diagnostics as JSON lines
        #[arg(long)]
        json_logs: bool,
    },
    /// Start the console chat (default)
    Chat(ChatArgs),
    /// Send a single prompt and print the streamed reply
    Say {
        #[command(flatten)]
        session: SessionArgs,
        /// Prompt text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Set configuration values, or print them when no value is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct SessionArgs {
    /// Agent mode for this session
    #[arg(short = 'm', long, value_enum)]
    pub mode: Option<AgentMode>,
    /// Document to upload before the first message (repeatable)
    #[arg(short = 'd', long = "doc", value_name = "FILE")]
    pub docs: Vec<PathBuf>,
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct ChatArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    /// Append the transcript to this file
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

/// Connection settings shared by `chat` and `say`.
pub struct RelayClient {
    client: reqwest::Client,
    relay_url: String,
    token: Option<String>,
}

impl RelayClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url: config.relay_url(),
            token: std::env::var(RELAY_TOKEN_ENV).ok(),
        }
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn stream_params(&self, prepared: PreparedSend) -> StreamParams {
        StreamParams {
            client: self.client.clone(),
            relay_url: self.relay_url.clone(),
            api_key: self.token.clone(),
            request: prepared.request,
            cancel_token: prepared.cancel_token,
            stream_id: prepared.stream_id,
        }
    }
}

/// Create a session for `args` and upload its documents.
pub async fn open_session(
    config: &Config,
    args: &SessionArgs,
    logging: LoggingState,
) -> ChatSession {
    let mode = args.mode.unwrap_or_else(|| config.mode());
    let mut session = ChatSession::new(mode, config.model_label(), logging);
    for path in &args.docs {
        let document = session.documents_mut().upload_path(path).await;
        if document.chunks == 0 {
            eprintln!("⚠️  No text extracted from {}", document.name);
        }
    }
    session
}

/// Forward every Ctrl+C to one receiver for the rest of the process.
///
/// The listener is registered before this returns, so an interrupt is never
/// lost between two reads of the receiver.
pub fn interrupts() -> std::io::Result<mpsc::UnboundedReceiver<()>> {
    let (tx, rx) = mpsc::unbounded_channel();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            while sigint.recv().await.is_some() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

pub fn init_tracing(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = if json {
        builder.json().with_target(false).try_init()
    } else {
        builder.try_init()
    };
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    match &args.command {
        Some(Commands::Serve { json_logs, .. }) => init_tracing("info", *json_logs),
        _ => init_tracing("warn", false),
    }

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    match args
        .command
        .unwrap_or_else(|| Commands::Chat(ChatArgs::default()))
    {
        Commands::Serve { listen, .. } => run_serve(listen).await,
        Commands::Chat(chat_args) => chat::run_chat(chat_args).await,
        Commands::Say { session, prompt } => say::run_say(session, prompt).await,
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            let value = value.join(" ");
            match key {
                Some(key) if !value.trim().is_empty() => {
                    let key: ConfigKey = key.parse()?;
                    config.set(key, &value)?;
                    config.save()?;
                    println!("✅ Set {key} to: {}", value.trim());
                }
                _ => config.print_all(),
            }
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            let key: ConfigKey = key.parse()?;
            config.unset(key);
            config.save()?;
            println!("✅ Unset {key}");
            Ok(())
        }
    }
}

async fn run_serve(listen: Option<SocketAddr>) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let listen = match listen {
        Some(addr) => addr,
        None => config.listen_addr()?,
    };

    if std::env::var(GATEWAY_API_KEY_ENV).is_err() {
        warn!("{GATEWAY_API_KEY_ENV} is not set; chat requests will fail");
    }
    info!(gateway = config.gateway_url(), "using AI gateway");

    let state = RelayState {
        upstream: Arc::new(GatewayClient::from_env(config.gateway_url())),
        model: config.model().to_string(),
    };
    relay::serve(listen, state).await?;
    Ok(())
}
