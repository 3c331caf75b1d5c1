mod access;
mod admin;
mod api;
mod cli;
mod config;
mod credentials;
mod dashboard;
mod error;
mod gate;
mod inventory;
mod model;
mod orchestrator;
mod remote;
mod runtime;
mod status;
mod storage;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr so command output on stdout stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("container_control=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run(args).await
}
