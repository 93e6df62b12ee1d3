//! Clap CLI definitions for KeyShare.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  keyshare agent                          Run the agent until Ctrl+C
  keyshare get -p 1 3.1.0                 Read the number of valid keys
  keyshare get -p 2 1.1.0:5               Read 1.1.0 and the five entries after it
  keyshare set -p 3 3.2.1.6.0=2           Issue a public key
  keyshare set -p 4 1.5.0=32 1.6.0=600    Raise the quota and shorten the TTL";

/// KeyShare: matrix-derived key distribution over UDP.
#[derive(Parser)]
#[command(name = "keyshare", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent in the foreground.
    Agent {
        /// Override `network.bind_addr`.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Send a GET request and print the response.
    Get {
        #[command(flatten)]
        target: RequestTarget,
        /// OIDs to read, each optionally followed by `:N` to also read the N
        /// entries after it.
        #[arg(value_name = "OID[:N]", required = true)]
        items: Vec<String>,
    },
    /// Send a SET request and print the response.
    Set {
        #[command(flatten)]
        target: RequestTarget,
        /// Assignments. Values that parse as integers are sent as integers.
        #[arg(value_name = "OID=VALUE", required = true)]
        items: Vec<String>,
    },
}

/// Options shared by the manager commands.
#[derive(clap::Args)]
pub struct RequestTarget {
    /// Request id (P). Must not be reused within the retry interval.
    #[arg(short = 'p', long = "request-id")]
    pub request_id: u64,
    /// Override `manager.agent_addr`.
    #[arg(long)]
    pub agent: Option<SocketAddr>,
}
