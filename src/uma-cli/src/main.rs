mod cli;
mod commands;
mod config;
mod dispatch;
mod session;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose {
        "uma=debug,uma_cli=debug"
    } else {
        "uma=info,uma_cli=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dispatch::dispatch(cli.command, &cli.global)
}
