//! tokenkeep - sign in once, then call protected endpoints with the saved session.
//!
//! The session token is persisted between runs (file or OS keychain, see
//! `~/.config/tokenkeep/config.json`) and every invocation restores it before
//! doing anything else.

mod app;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, Command};

const USAGE: &str = "\
Usage: tokenkeep <command>

Commands:
  login [username]   Sign in and save the session
  logout             End the session
  status | whoami    Show the signed-in user
  get <url>          GET a protected URL with the session token
  has-role <role>    Exit 0 if the signed-in user has <role>";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes buffered log lines when dropped.
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

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = Command::parse(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    info!(?command, "tokenkeep starting");
    let mut app = App::new()?;
    let code = app.run(command).await?;

    drop(guard);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
