//! KeyShare CLI: runs the agent or sends one manager request to it.

mod cli;
mod cmd;
mod ui;

use crate::cli::{Cli, Commands};
use clap::Parser;
use keyshare_kernel::config::load_config;

/// Log to stderr. `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Agent { bind } => cmd::agent::cmd_agent(config, bind),
        Commands::Get { target, items } => cmd::request::cmd_get(&config, target, &items),
        Commands::Set { target, items } => cmd::request::cmd_set(&config, target, &items),
    }
}
