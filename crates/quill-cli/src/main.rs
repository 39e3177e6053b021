//! Quill CLI - submit synthesis jobs and ask questions from the terminal
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt as _, registry, util::SubscriberInitExt as _,
};

use cli::{Cli, Commands};

mod cli;
mod handlers;

#[tokio::main]
async fn main() -> Result<()> {
    registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "quill=info".into()))
        .with(fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = handlers::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask { question, complex } => {
            handlers::handle_ask(&config, question, complex, cli.metrics).await?;
        }
        Commands::Synthesize(args) => {
            handlers::handle_synthesize(&config, args, cli.metrics).await?;
        }
        Commands::Config { full } => {
            handlers::handle_config(&config, full)?;
        }
    }

    Ok(())
}
