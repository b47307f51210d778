//! The Librarian CLI - a command-line client for the library-management API.
//!
//! Every call goes through the core `ApiClient`; this binary only parses
//! arguments, prints results, and decides what to do when the session
//! becomes invalid.

mod commands;
mod format;

use std::io;

use anyhow::Result;
use clap::Parser;
use librarian_core::{ApiClient, ApiError, ClientConfig, SessionEvent};
use tokio::sync::broadcast;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{Cli, Command};

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

/// Drain pending session events; true if the session was invalidated.
fn session_invalidated(events: &mut broadcast::Receiver<SessionEvent>) -> bool {
    let mut invalidated = false;
    while let Ok(event) = events.try_recv() {
        debug!(?event, "Session event");
        invalidated |= event == SessionEvent::SessionInvalidated;
    }
    invalidated
}

fn print_error(e: &anyhow::Error) {
    match e.downcast_ref::<ApiError>() {
        // reported after the session events are drained
        Some(api) if api.requires_login() => {}
        Some(api) => {
            debug!(error = %api, "Request failed");
            eprintln!("{}", api.user_message());
        }
        None => eprintln!("Error: {:#}", e),
    }
}

async fn run(cli: Cli) -> Result<bool> {
    if let Command::Config(ref args) = cli.command {
        return commands::configure(cli.api_url.as_deref(), args);
    }

    let mut config = ClientConfig::load()?;
    if let Some(url) = cli.api_url {
        config.base_url = url;
        config.validate()?;
    }
    info!(base_url = %config.base_url, "Librarian CLI starting");
    let client = ApiClient::from_config(config)?;
    let mut events = client.subscribe();

    let signing_out = cli.command == Command::Logout;
    let result = commands::run(&client, cli.command).await;
    // Only this handler tells the user to sign in again
    if session_invalidated(&mut events) && !signing_out {
        eprintln!("Session expired. Run `librarian login` to sign in again.");
    }
    result
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let guard = init_tracing();

    let code = match run(cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            print_error(&e);
            1
        }
    };

    // Flush buffered log lines before exiting
    drop(guard);
    std::process::exit(code);
}
