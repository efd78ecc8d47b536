//! gssh - Entry point
//!
//! Parses CLI arguments, sets up logging on stderr, and runs the selected
//! command. Any error is printed once and turns into exit code 1.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gssh::app;
use gssh::config::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let args = Args::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level()));

    // Initialize tracing/logging to stderr (stdout belongs to the remote session)
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("gssh v{} starting", env!("CARGO_PKG_VERSION"));

    match app::run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
