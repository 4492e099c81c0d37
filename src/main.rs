use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

mod app;
mod ask;
mod client;
mod config;
mod handler;
mod logging;
mod markdown;
mod reasoning;
mod session;
mod tui;
mod ui;

use app::App;
use client::{ChatClient, ChatTransport};
use config::{Config, Settings};
use logging::LogTarget;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "agent-chat", version)]
#[command(about = "Chat with a streaming LLM backend from the terminal")]
struct Cli {
    /// Backend base address (overrides the config file)
    #[arg(long, global = true, env = "AGENT_CHAT_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Send one message and print the reply as it streams in
    Ask {
        /// Your question
        message: String,
        /// Use the non-streaming endpoint
        #[arg(long)]
        no_stream: bool,
        /// Keep <think> sections in the output
        #[arg(long)]
        show_reasoning: bool,
    },
    /// Check that the backend is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat);

    let log_target = match command {
        Commands::Chat => LogTarget::default_file()?,
        _ => LogTarget::Stderr,
    };
    let _log_guard = logging::init(log_target)?;

    let settings = Config::load()?.resolve(cli.base_url.as_deref())?;
    tracing::debug!(base_url = %settings.base_url, "settings resolved");

    match command {
        Commands::Chat => {
            run_tui(settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ask { message, no_stream, show_reasoning } => {
            let hide_reasoning = settings.hide_reasoning && !show_reasoning;
            let client = ChatClient::new(settings.base_url);
            if no_stream {
                ask::ask_once(&client, &message, hide_reasoning, io::stdout(), io::stderr()).await
            } else {
                let transport = Arc::new(client);
                ask::ask_streaming(transport, message, hide_reasoning, io::stdout(), io::stderr())
                    .await
            }
        }
        Commands::Health => {
            let client = ChatClient::new(settings.base_url);
            ask::check_health(&client, io::stdout(), io::stderr()).await
        }
    }
}

async fn run_tui(settings: Settings) -> Result<()> {
    let transport: Arc<dyn ChatTransport> = Arc::new(ChatClient::new(settings.base_url.clone()));
    let (stream_tx, stream_rx) = mpsc::unbounded_channel();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(stream_rx);

    let mut app = App::new(&settings, transport, stream_tx, events.sender());
    app.persist_settings = true;
    app.check_backend();

    let result = run_loop(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event)?;
    }
    Ok(())
}
