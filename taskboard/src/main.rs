//! `taskboard` -- terminal client for the real-time task board.
//!
//! ```bash
//! # Follow the board live (default subcommand)
//! cargo run --bin taskboard
//!
//! # One-shot commands
//! cargo run --bin taskboard -- create --title "Write spec" --priority High
//! cargo run --bin taskboard -- move 1 done
//! cargo run --bin taskboard -- delete 1
//!
//! # Point at another server
//! TASKBOARD_URL=ws://board.local:5001/ws cargo run --bin taskboard -- list
//! ```

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use taskboard::client::{self, BoardClient, ClientError, ClientEvent};
use taskboard::config::{CliArgs, ClientConfig, Command};
use taskboard::render;
use taskboard_proto::protocol::{ClientMessage, TaskMove, TaskRef, TaskUpdate};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file; stdout is reserved for the board.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(url = %config.server_url, "taskboard starting");

    let command = cli.command.unwrap_or(Command::Watch);
    let result = run(command, &config).await;

    tracing::info!("taskboard exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, config: &ClientConfig) -> Result<(), ClientError> {
    let net = config.to_net_config();
    let request = match command {
        Command::Watch => return watch(config).await,
        Command::List => {
            let view = client::fetch_board(&net).await?;
            print!("{}", render::render_board(&view, &config.timestamp_format));
            return Ok(());
        }
        Command::Create(fields) => ClientMessage::Create(fields.into_draft()),
        Command::Update { id, fields } => ClientMessage::Update(TaskUpdate {
            id: id.into(),
            patch: fields.into_patch(),
        }),
        Command::Move { id, column } => ClientMessage::Move(TaskMove {
            id: id.into(),
            column,
        }),
        Command::Delete { id } => ClientMessage::Delete(TaskRef { id: id.into() }),
    };

    let (answer, view) = client::request_once(&net, &request).await?;
    println!("{}", render::describe_event(&answer));
    println!("{}", render::stats_line(&view.stats()));
    Ok(())
}

/// Follows the board until the server goes away for good.
async fn watch(config: &ClientConfig) -> Result<(), ClientError> {
    let (client, mut events) = BoardClient::connect(&config.to_net_config()).await?;
    let view = client.view_handle();

    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Connected => println!("-- connected to {}", config.server_url),
            ClientEvent::Disconnected => println!("-- connection lost, reconnecting"),
            ClientEvent::Message(msg) => {
                let text = {
                    let mut view = view.lock();
                    let text = render::render_board(&view, &config.timestamp_format);
                    // The banner is shown once per error.
                    view.clear_error();
                    text
                };
                if msg.is_broadcast() {
                    println!("-- {}", render::describe_event(&msg));
                }
                print!("{text}");
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
