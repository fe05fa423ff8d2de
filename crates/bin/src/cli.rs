//! CLI argument definitions for the Livetree binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Livetree live document store server
#[derive(Parser, Debug)]
#[command(name = "livetree")]
#[command(about = "Livetree: a hierarchical JSON document store with live subscriptions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Livetree server
    Serve(ServeArgs),
    /// Check health of a running Livetree server
    Health(HealthArgs),
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "LIVETREE_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "LIVETREE_HOST")]
    pub host: String,

    /// Data directory; the store is persisted to livetree.json inside it
    #[arg(short = 'D', long, env = "LIVETREE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// URL prefix under which documents are served; must not be empty
    #[arg(long, default_value = "/db", env = "LIVETREE_PREFIX")]
    pub prefix: String,
}

/// Arguments for the health command
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server to check
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "LIVETREE_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}
