mod cli;
mod commands;
mod input;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn main() -> Result<()> {
    // Initialize logging; script output is logged under the `script` target
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("luafront=info".parse()?)
                .add_directive("script=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!("luafront {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Command::Games) => commands::games::run(&cli),
        Some(Command::Validate { json }) => commands::validate::run(&cli, json),
        Some(Command::Run) | None => commands::run::run(&cli),
    }
}
